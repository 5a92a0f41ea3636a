//! Collected media lists persisted between collection and download.
//!
//! A manifest is written right after a profile has been scrolled, so a run
//! interrupted during downloading can be resumed without the browser.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::threads::urls::{author_folder_name, profile_handle};
use crate::threads::MediaItem;

const MANIFEST_EXTENSION: &str = "json";

/// Error types for manifests
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for manifest operations
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Media collected from one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub author: String,
    pub profile_url: String,
    pub collected_at: DateTime<Utc>,
    pub items: Vec<MediaItem>,
}

impl Manifest {
    pub fn new(author: impl Into<String>, profile_url: impl Into<String>, items: Vec<MediaItem>) -> Self {
        Self {
            author: author.into(),
            profile_url: profile_url.into(),
            collected_at: Utc::now(),
            items,
        }
    }

    /// File stem: the profile handle, or the author folder name for URLs
    /// without one.
    pub fn file_stem(&self) -> String {
        profile_handle(&self.profile_url).unwrap_or_else(|| author_folder_name(&self.author, &self.profile_url))
    }

    /// `<dir>/<handle>.json`
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.file_stem(), MANIFEST_EXTENSION))
    }

    /// Writes the manifest into `dir` and returns its path.
    ///
    /// A file already holding another profile's manifest is never replaced; a
    /// numbered name is used instead.
    pub fn save_in(&self, dir: &Path) -> ManifestResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let stem = self.file_stem();
        let mut path = self.path_in(dir);
        let mut suffix = 2;
        while path.exists() && !self.same_profile_as(&path) {
            path = dir.join(format!("{}-{}.{}", stem, suffix, MANIFEST_EXTENSION));
            suffix += 1;
        }
        self.save_to(&path)?;
        Ok(path)
    }

    /// Writes the manifest to `path`, replacing what is there.
    pub fn save_to(&self, path: &Path) -> ManifestResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved manifest with {} items to {}", self.items.len(), path.display());
        Ok(())
    }

    fn same_profile_as(&self, path: &Path) -> bool {
        Self::load(path).is_ok_and(|existing| existing.profile_url == self.profile_url)
    }

    pub fn load(path: &Path) -> ManifestResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Manifest files in `dir`, sorted by name. A missing directory is empty.
    pub fn pending_in(dir: &Path) -> ManifestResult<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_manifest = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(MANIFEST_EXTENSION);
            if is_manifest {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Deletes a manifest whose downloads completed.
    pub fn discard(path: &Path) -> ManifestResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_load_and_listing() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::new(
            "Some/One",
            "https://www.threads.net/@someone",
            vec![
                MediaItem::new("https://x/a.jpg", Some(0)),
                MediaItem::new("https://x/b.mp4", None),
            ],
        );

        let path = manifest.save_in(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "someone.json");
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(Manifest::load(&path).unwrap(), manifest);
        assert_eq!(Manifest::pending_in(dir.path()).unwrap(), vec![path.clone()]);

        Manifest::discard(&path).unwrap();
        assert!(Manifest::pending_in(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_same_author_on_two_profiles_keeps_both() {
        let dir = tempdir().unwrap();
        let first = Manifest::new("Sam", "https://www.threads.net/", vec![MediaItem::new("https://x/1.jpg", Some(0))]);
        let second = Manifest::new("Sam", "https://threads.example/", vec![MediaItem::new("https://x/2.jpg", Some(0))]);

        let first_path = first.save_in(dir.path()).unwrap();
        let second_path = second.save_in(dir.path()).unwrap();

        assert_eq!(first_path.file_name().unwrap(), "Sam.json");
        assert_eq!(second_path.file_name().unwrap(), "Sam-2.json");
        assert_eq!(Manifest::load(&first_path).unwrap(), first);
        assert_eq!(Manifest::load(&second_path).unwrap(), second);

        // Saving the same profile again reuses its file.
        assert_eq!(first.save_in(dir.path()).unwrap(), first_path);
    }

    #[test]
    fn test_blank_author_without_handle() {
        let manifest = Manifest::new("...", "https://www.threads.net/", Vec::new());
        assert_eq!(manifest.file_stem(), "unknown");
    }

    #[test]
    fn test_missing_directory_has_no_pending() {
        let dir = tempdir().unwrap();
        assert!(Manifest::pending_in(&dir.path().join("none")).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Manifest::load(&path), Err(ManifestError::Json(_))));
    }
}
