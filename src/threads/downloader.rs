//! Concurrent batch downloader
//!
//! This module provides a download pool that:
//! 1. Runs a fixed number of workers over a pre-built job queue
//! 2. Gives every worker its own HTTP session for connection reuse
//! 3. Streams bodies to disk through a fixed-size buffer
//! 4. Retries 5xx responses and transport errors with exponential backoff
//! 5. Tallies outcomes in a single coordinator fed by a channel

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::threads::fetch::{
    ByteStream, FetchError, HttpFetch, ReqwestSessionProvider, SessionProvider,
};
use crate::threads::tui::download_bar;
use crate::threads::urls::unique_file_name;
use crate::threads::MediaItem;

/// Error types for the downloader
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid downloader config: {0}")]
    InvalidConfig(String),

    #[error("Could not open HTTP session: {0}")]
    Session(#[from] FetchError),
}

/// Result type for download operations
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Why a single job failed.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl JobError {
    fn is_retryable(&self) -> bool {
        match self {
            JobError::Status(status) => (500..600).contains(status),
            JobError::Fetch(e) => e.is_transient(),
            JobError::Io(_) => false,
        }
    }
}

/// Downloader configuration
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub workers: usize,
    /// Bound on waiting for the response head and for each body chunk.
    pub request_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    /// Write buffer size used while streaming a body to disk.
    pub buffer_size: usize,
    pub show_progress: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            request_timeout: Duration::from_secs(20),
            max_retries: 3,
            base_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(60),
            buffer_size: 128 * 1024,
            show_progress: true,
        }
    }
}

impl DownloaderConfig {
    pub fn validate(&self) -> DownloadResult<()> {
        if self.workers == 0 {
            return Err(DownloadError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(DownloadError::InvalidConfig(
                "buffer size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    pub group: Option<u32>,
    pub file_name: String,
    pub path: PathBuf,
}

impl DownloadJob {
    pub fn from_item(item: &MediaItem, folder: &Path) -> Self {
        let file_name = unique_file_name(&item.url, item.group);
        Self {
            url: item.url.clone(),
            group: item.group,
            path: folder.join(&file_name),
            file_name,
        }
    }
}

/// Result of one job after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Succeeded { bytes: u64 },
    Failed { reason: String },
}

/// Totals of a batch. `succeeded + failed` equals the number of items.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Items that did not reach the disk, in input order.
    pub failed_items: Vec<MediaItem>,
}

impl DownloadReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// `(succeeded, failed)`
    pub fn counts(&self) -> (usize, usize) {
        (self.succeeded, self.failed)
    }
}

struct JobReport {
    index: usize,
    url: String,
    outcome: DownloadOutcome,
}

/// Downloads media lists with a bounded worker pool.
pub struct Downloader<S> {
    config: DownloaderConfig,
    provider: S,
}

impl Downloader<ReqwestSessionProvider> {
    /// Create a downloader with reqwest sessions and default headers
    pub fn with_reqwest(config: DownloaderConfig) -> Self {
        Self::new(config, ReqwestSessionProvider::default())
    }
}

impl<S: SessionProvider> Downloader<S> {
    pub fn new(config: DownloaderConfig, provider: S) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Fetches every item into `folder`.
    ///
    /// Individual failures are counted and listed in the report, not returned
    /// as errors. Errors are reserved for setup problems: invalid config, an
    /// uncreatable folder, or a session that cannot be opened.
    #[instrument(skip_all, fields(items = items.len(), folder = %folder.as_ref().display()))]
    pub async fn batch_download(
        &self,
        items: &[MediaItem],
        folder: impl AsRef<Path>,
    ) -> DownloadResult<DownloadReport> {
        self.config.validate()?;
        let folder = folder.as_ref();
        let total = items.len();
        if total == 0 {
            info!("No media to download.");
            return Ok(DownloadReport::default());
        }

        fs::create_dir_all(folder).await?;

        let queue: VecDeque<(usize, DownloadJob)> = items
            .iter()
            .map(|item| DownloadJob::from_item(item, folder))
            .enumerate()
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let config = Arc::new(self.config.clone());
        let worker_count = self.config.workers.min(total);

        let mut sessions = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            sessions.push(self.provider.open_session()?);
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(worker_count);
        for (id, session) in sessions.into_iter().enumerate() {
            let queue = queue.clone();
            let tx = tx.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                run_worker(id, session, queue, tx, config).await;
            }));
        }
        drop(tx);

        let bar = download_bar(total as u64, self.config.show_progress);
        let mut report = DownloadReport::default();
        let mut reported = vec![false; total];
        let mut failed_indices = Vec::new();
        while let Some(job) = rx.recv().await {
            reported[job.index] = true;
            match job.outcome {
                DownloadOutcome::Succeeded { bytes } => {
                    report.succeeded += 1;
                    debug!(url = %job.url, bytes, "Downloaded");
                }
                DownloadOutcome::Failed { reason } => {
                    report.failed += 1;
                    failed_indices.push(job.index);
                    warn!(url = %job.url, "Download failed: {}", reason);
                }
            }
            bar.set_message(format!("Success: {} | Failed: {}", report.succeeded, report.failed));
            bar.inc(1);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Download worker ended abnormally: {}", e);
            }
        }

        let missing: Vec<usize> = reported
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(index, _)| index)
            .collect();
        if !missing.is_empty() {
            error!("{} jobs were lost by crashed workers", missing.len());
            report.failed += missing.len();
            failed_indices.extend(missing);
        }
        failed_indices.sort_unstable();
        report.failed_items = failed_indices.into_iter().map(|index| items[index].clone()).collect();

        bar.finish_with_message(format!("Success: {} | Failed: {}", report.succeeded, report.failed));
        info!(
            "Completed: {} downloaded, {} failed.",
            report.succeeded, report.failed
        );
        Ok(report)
    }
}

async fn run_worker(
    id: usize,
    session: Box<dyn HttpFetch>,
    queue: Arc<Mutex<VecDeque<(usize, DownloadJob)>>>,
    tx: mpsc::UnboundedSender<JobReport>,
    config: Arc<DownloaderConfig>,
) {
    loop {
        let next = queue.lock().pop_front();
        let Some((index, job)) = next else { break };

        let outcome = match download_with_retry(session.as_ref(), &job, &config).await {
            Ok(bytes) => DownloadOutcome::Succeeded { bytes },
            Err(e) => DownloadOutcome::Failed {
                reason: e.to_string(),
            },
        };
        let report = JobReport {
            index,
            url: job.url,
            outcome,
        };
        if tx.send(report).is_err() {
            break;
        }
    }
    debug!(worker = id, "Download worker finished");
}

async fn download_with_retry(
    session: &dyn HttpFetch,
    job: &DownloadJob,
    config: &DownloaderConfig,
) -> Result<u64, JobError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_download(session, job, config).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => {
                remove_partial(&job.path).await;
                if !e.is_retryable() || attempt > config.max_retries {
                    return Err(e);
                }
                let backoff = calculate_backoff(attempt, config.base_retry_delay, config.max_retry_delay);
                debug!(url = %job.url, attempt, ?backoff, "Retrying after error: {}", e);
                sleep(backoff).await;
            }
        }
    }
}

async fn attempt_download(
    session: &dyn HttpFetch,
    job: &DownloadJob,
    config: &DownloaderConfig,
) -> Result<u64, JobError> {
    let response = timeout(config.request_timeout, session.get(&job.url))
        .await
        .map_err(|_| FetchError::Timeout(format!("no response within {:?}", config.request_timeout)))??;

    if !response.is_success() {
        return Err(JobError::Status(response.status));
    }
    stream_to_file(response.body, &job.path, config).await
}

/// Writes a body to `path` and returns the number of bytes written.
async fn stream_to_file(
    mut body: ByteStream,
    path: &Path,
    config: &DownloaderConfig,
) -> Result<u64, JobError> {
    let file = File::create(path).await?;
    let mut writer = BufWriter::with_capacity(config.buffer_size, file);
    let mut written = 0u64;

    loop {
        let next = timeout(config.request_timeout, body.next())
            .await
            .map_err(|_| FetchError::Timeout(format!("body stalled for {:?}", config.request_timeout)))?;
        let Some(chunk) = next else { break };
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    writer.flush().await?;
    Ok(written)
}

async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial file {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial file {}: {}", path.display(), e),
    }
}

/// `base * 2^(attempt - 1)`, capped at `max`.
pub fn calculate_backoff(attempt: usize, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31) as u32;
    base.saturating_mul(1u32 << exponent).min(max)
}

/// Downloads `items` into `folder` with reqwest sessions and default settings.
pub async fn batch_download(
    items: &[MediaItem],
    folder: impl AsRef<Path>,
    worker_count: usize,
) -> DownloadResult<DownloadReport> {
    let config = DownloaderConfig {
        workers: worker_count,
        ..DownloaderConfig::default()
    };
    Downloader::with_reqwest(config).batch_download(items, folder).await
}
