//! Per-profile orchestration: restore cookies, scroll and collect, persist
//! the media list, download it, save cookies again.
//!
//! Profiles share one page session and are processed strictly one after
//! another.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::threads::collector::Collector;
use crate::threads::cookies::{CookieError, CookieJar};
use crate::threads::downloader::{DownloadError, DownloadReport, Downloader};
use crate::threads::fetch::SessionProvider;
use crate::threads::manifest::{Manifest, ManifestError};
use crate::threads::page::{author_name, PageDriver, PageError};
use crate::threads::urls::author_folder_name;

/// Error types for profile runs
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Cookie error: {0}")]
    Cookie(#[from] CookieError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
}

/// Result type for profile runs
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Page a session starts from before cookies are applied.
pub const THREADS_HOME_URL: &str = "https://www.threads.net/";

/// Where a run reads and writes its state.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Page opened before cookies are applied.
    pub home_url: String,
    pub download_dir: PathBuf,
    /// Manifests are skipped when `None`.
    pub manifest_dir: Option<PathBuf>,
    /// Cookies are neither loaded nor saved when `None`.
    pub cookies_file: Option<PathBuf>,
}

/// What happened to one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub profile_url: String,
    pub author: String,
    pub collected: usize,
    pub report: DownloadReport,
    /// Kept manifest, present only when some downloads failed.
    pub manifest: Option<PathBuf>,
}

/// Drives collection and download for a list of profiles.
pub struct ProfileRunner<P, S> {
    page: P,
    collector: Collector,
    downloader: Downloader<S>,
    settings: RunnerSettings,
}

impl<P: PageDriver, S: SessionProvider> ProfileRunner<P, S> {
    pub fn new(page: P, collector: Collector, downloader: Downloader<S>, settings: RunnerSettings) -> Self {
        Self {
            page,
            collector,
            downloader,
            settings,
        }
    }

    /// Opens the home page and injects saved cookies. Returns how many were applied.
    pub async fn restore_session(&mut self) -> RunnerResult<usize> {
        self.page.navigate(&self.settings.home_url).await?;
        let Some(path) = &self.settings.cookies_file else {
            return Ok(0);
        };
        let jar = CookieJar::load(path)?;
        Ok(jar.apply_to(&mut self.page).await?)
    }

    /// Writes the browser's current cookies to the cookie file.
    pub async fn save_session(&mut self) -> RunnerResult<()> {
        if let Some(path) = &self.settings.cookies_file {
            CookieJar::capture(&mut self.page).await?.save(path)?;
        }
        Ok(())
    }

    /// Collects and downloads one profile.
    #[instrument(skip(self))]
    pub async fn run_profile(&mut self, profile_url: &str) -> RunnerResult<ProfileSummary> {
        self.page.navigate(profile_url).await?;
        let author = author_name(&mut self.page, &self.collector.config().dom).await?;
        info!("[{}] Scrolling and collecting media...", author);

        let media = self.collector.collect_all_media(&mut self.page).await;
        info!("[{}] Found {} media items.", author, media.len());

        let saved = match &self.settings.manifest_dir {
            Some(dir) => {
                let manifest = Manifest::new(&author, profile_url, media.clone());
                let path = manifest.save_in(dir)?;
                Some((manifest, path))
            }
            None => None,
        };

        let target = self.settings.download_dir.join(author_folder_name(&author, profile_url));
        let report = self.downloader.batch_download(&media, &target).await?;

        let manifest = match saved {
            Some((manifest, path)) => settle_manifest(manifest, &path, &report)?,
            None => None,
        };

        if let Err(e) = self.save_session().await {
            warn!("Could not save cookies: {}", e);
        }

        Ok(ProfileSummary {
            profile_url: profile_url.to_string(),
            author,
            collected: media.len(),
            report,
            manifest,
        })
    }

    /// Runs every profile in order.
    ///
    /// A profile whose page cannot be read is logged and skipped; download
    /// setup failures abort the run.
    pub async fn run_all(&mut self, profile_urls: &[String]) -> RunnerResult<Vec<ProfileSummary>> {
        let mut summaries = Vec::with_capacity(profile_urls.len());
        for url in profile_urls {
            match self.run_profile(url).await {
                Ok(summary) => summaries.push(summary),
                Err(RunnerError::Page(e)) => error!("Skipping profile {}: {}", url, e),
                Err(e) => return Err(e),
            }
        }
        info!("All downloads complete!");
        Ok(summaries)
    }

    pub fn into_page(self) -> P {
        self.page
    }
}

/// Removes a manifest whose items all downloaded, or narrows it to the
/// failed ones so a resume fetches nothing twice. Returns the kept path.
fn settle_manifest(mut manifest: Manifest, path: &Path, report: &DownloadReport) -> RunnerResult<Option<PathBuf>> {
    if report.failed_items.is_empty() {
        Manifest::discard(path)?;
        return Ok(None);
    }
    manifest.items = report.failed_items.clone();
    manifest.save_to(path)?;
    info!(
        "[{}] Kept {} failed items in {}",
        manifest.author,
        manifest.items.len(),
        path.display()
    );
    Ok(Some(path.to_path_buf()))
}

/// Downloads a saved manifest into `<download_dir>/<author>`.
///
/// The manifest is removed once every item succeeded; otherwise it keeps
/// only the items that failed.
pub async fn resume_manifest<S: SessionProvider>(
    downloader: &Downloader<S>,
    manifest_path: &Path,
    download_dir: &Path,
) -> RunnerResult<DownloadReport> {
    let manifest = Manifest::load(manifest_path)?;
    info!(
        "[{}] Resuming {} media items from {}",
        manifest.author,
        manifest.items.len(),
        manifest_path.display()
    );
    let target = download_dir.join(author_folder_name(&manifest.author, &manifest.profile_url));
    let report = downloader.batch_download(&manifest.items, &target).await?;
    settle_manifest(manifest, manifest_path, &report)?;
    Ok(report)
}
