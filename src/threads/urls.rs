//! URL helpers shared by the collector and the downloader.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use uuid::Uuid;

/// Extension used when a URL carries no usable suffix.
pub const FALLBACK_EXTENSION: &str = "file";

/// Folder name used when neither the author nor the profile URL yields one.
pub const UNKNOWN_AUTHOR: &str = "unknown";

static EXTENSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{1,8}$").expect("extension pattern is valid"));

/// Returns the path component of `raw`, without query or fragment.
///
/// Falls back to plain string splitting for inputs that are not absolute URLs,
/// which is what makes [`normalize_url`] idempotent on bare keys.
fn url_path(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => {
            let end = raw.find(['?', '#']).unwrap_or(raw.len());
            raw[..end].to_string()
        }
    }
}

/// Deduplication key of a media URL: the basename of its path.
///
/// `https://cdn/x/abc.jpg?stp=1&_nc_ht=2` and `https://cdn2/y/abc.jpg` share the
/// key `abc.jpg`; the CDN serves the same asset under rotating hosts and query
/// signatures.
pub fn normalize_url(raw: &str) -> String {
    let path = url_path(raw);
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// File extension of a URL without the dot, or `"file"` when it is missing or
/// does not look like an extension.
pub fn get_file_extension(raw: &str) -> String {
    let basename = normalize_url(raw);
    match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && EXTENSION_PATTERN.is_match(ext) => {
            ext.to_ascii_lowercase()
        }
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

/// Builds a collision-free, time-sortable file name for a download.
pub fn unique_file_name(raw: &str, group: Option<u32>) -> String {
    let id = Uuid::now_v7();
    let ext = get_file_extension(raw);
    match group {
        Some(group) => format!("{group}_{id}.{ext}"),
        None => format!("{id}.{ext}"),
    }
}

/// Lower-cased host of a URL, if it has one.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Replaces characters that are not allowed in directory or file names.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// The `@handle` of a profile URL without the `@`, sanitized.
pub fn profile_handle(profile_url: &str) -> Option<String> {
    url_path(profile_url)
        .split('/')
        .find_map(|segment| segment.strip_prefix('@'))
        .map(sanitize_filename)
        .filter(|handle| !handle.is_empty())
}

/// Directory name for an author's downloads.
///
/// Uses the sanitized display name, then the profile handle, then `unknown`.
pub fn author_folder_name(author: &str, profile_url: &str) -> String {
    let name = sanitize_filename(author);
    if !name.is_empty() {
        return name;
    }
    profile_handle(profile_url).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}
