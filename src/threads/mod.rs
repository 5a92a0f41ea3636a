//! Threads profile scraping and media download.
//!
//! The [`collector`] scrolls a profile through a [`page::PageDriver`] and
//! returns every unique media URL; the [`downloader`] fetches such a list to
//! disk with a bounded worker pool. [`runner`] glues both together per
//! profile.

use serde::{Deserialize, Serialize};

pub mod collector;
pub mod cookies;
pub mod downloader;
pub mod fetch;
pub mod manifest;
pub mod page;
pub mod runner;
pub mod stall;
pub mod tui;
pub mod urls;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::{collect_all_media, CollectError, CollectResult, Collector, CollectorConfig};
pub use cookies::{Cookie, CookieError, CookieJar};
pub use downloader::{
    batch_download, DownloadError, DownloadJob, DownloadOutcome, DownloadReport, DownloadResult,
    Downloader, DownloaderConfig,
};
pub use fetch::{
    FetchError, FetchResponse, HeaderProfiles, HttpConfig, HttpFetch, ReqwestSessionProvider, SessionProvider,
};
pub use manifest::{Manifest, ManifestError};
pub use page::{author_name, DomContract, PageDriver, PageError, PageResult};
pub use runner::{
    resume_manifest, ProfileRunner, ProfileSummary, RunnerError, RunnerResult, RunnerSettings, THREADS_HOME_URL,
};
pub use stall::{PageProbe, ScrollState, StallKind, StallStrategy};
pub use urls::{get_file_extension, normalize_url};

/// A media URL and the ordinal of the post it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    pub group: Option<u32>,
}

impl MediaItem {
    pub fn new(url: impl Into<String>, group: Option<u32>) -> Self {
        Self {
            url: url.into(),
            group,
        }
    }
}

/// Which media elements the collector extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaKinds {
    pub images: bool,
    pub videos: bool,
}

impl MediaKinds {
    pub const ALL: Self = Self {
        images: true,
        videos: true,
    };

    pub fn any(&self) -> bool {
        self.images || self.videos
    }
}

impl Default for MediaKinds {
    fn default() -> Self {
        Self::ALL
    }
}
