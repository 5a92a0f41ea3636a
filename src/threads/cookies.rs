//! Cookie persistence so later runs stay logged in.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::threads::page::{PageDriver, PageError};
use crate::threads::urls::host_of;

/// Error types for cookie persistence
#[derive(Error, Debug)]
pub enum CookieError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Page error: {0}")]
    Page(#[from] PageError),
}

/// Result type for cookie operations
pub type CookieResult<T> = Result<T, CookieError>;

/// One browser cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, rename = "httpOnly")]
    pub http_only: bool,
    #[serde(default)]
    pub expiry: Option<i64>,
}

fn default_path() -> String {
    "/".to_string()
}

/// Whether a cookie stored for `cookie_domain` may be injected into a page on
/// `page_host`.
///
/// Leading dots and case are ignored; either side may be a subdomain of the
/// other. An empty cookie domain always matches.
pub fn domain_matches(cookie_domain: &str, page_host: &str) -> bool {
    let cookie = cookie_domain.trim_start_matches('.').to_ascii_lowercase();
    let host = page_host.trim_start_matches('.').to_ascii_lowercase();
    if cookie.is_empty() {
        return true;
    }
    let is_suffix = |long: &str, short: &str| {
        long == short || long.ends_with(&format!(".{short}"))
    };
    is_suffix(&host, &cookie) || is_suffix(&cookie, &host)
}

/// Cookies saved from a browser session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieJar {
    pub cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    /// Reads a jar from disk. A missing file yields an empty jar.
    pub fn load(path: impl AsRef<Path>) -> CookieResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No cookie file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let cookies: Vec<Cookie> = serde_json::from_str(&content)?;
        Ok(Self { cookies })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CookieResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.cookies)?)?;
        Ok(())
    }

    /// Cookies that belong to `page_host`.
    pub fn for_host<'a>(&'a self, page_host: &'a str) -> impl Iterator<Item = &'a Cookie> + 'a {
        self.cookies
            .iter()
            .filter(move |c| domain_matches(&c.domain, page_host))
    }

    /// Snapshot of the cookies the page currently holds.
    pub async fn capture<P: PageDriver>(page: &mut P) -> CookieResult<Self> {
        Ok(Self::new(page.cookies().await?))
    }

    /// Injects the matching cookies into `page` and reloads it.
    ///
    /// Cookies for other domains are skipped, as are cookies the page refuses.
    /// Returns the number of cookies applied.
    pub async fn apply_to<P: PageDriver>(&self, page: &mut P) -> CookieResult<usize> {
        if self.cookies.is_empty() {
            return Ok(0);
        }
        let current = page.current_url().await?;
        let host = host_of(&current).unwrap_or_default();

        let matching: Vec<&Cookie> = self.for_host(&host).collect();
        let foreign = self.cookies.len() - matching.len();
        if foreign > 0 {
            debug!(host = %host, "Skipping {} cookies for other domains", foreign);
        }

        let mut applied = 0;
        for cookie in matching {
            match page.add_cookie(cookie).await {
                Ok(()) => applied += 1,
                Err(e) => warn!(cookie = %cookie.name, "Page rejected cookie: {}", e),
            }
        }

        page.refresh().await?;
        info!("Applied {} of {} saved cookies for {}", applied, self.cookies.len(), host);
        Ok(applied)
    }
}
