use std::path::PathBuf;

use anyhow::Error;
use console::Term;
use dialoguer::Confirm;
use tracing::{error, info, trace, warn};

use threads_downloader::config_loader::AppConfig;
use threads_downloader::threads::{
    resume_manifest, DownloadReport, Downloader, HttpConfig, Manifest, ReqwestSessionProvider,
};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Drives the binary: finds manifests left by earlier collection runs and
/// downloads them.
pub(crate) struct Program {
    config: AppConfig,
}

impl Program {
    pub(crate) fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub(crate) async fn run(&self) -> Result<(), Error> {
        let term = Term::stdout();
        term.set_title("threads downloader");
        trace!("Starting threads downloader...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        let manifest_dir = self.config.manifest_dir();
        let pending = Manifest::pending_in(&manifest_dir)?;
        if pending.is_empty() {
            info!("No pending manifests in {}.", manifest_dir.display());
            return Ok(());
        }
        info!("Found {} pending manifests in {}.", pending.len(), manifest_dir.display());

        if term.is_term() && !self.confirm_download(pending.len()) {
            info!("Exiting at user request...");
            return Ok(());
        }

        let total = self.download_all(&pending).await;
        info!(
            "Finished all manifests. Completed: {} downloaded, {} failed.",
            total.succeeded, total.failed
        );
        Ok(())
    }

    fn confirm_download(&self, count: usize) -> bool {
        Confirm::new()
            .with_prompt(format!("Download the media of {} pending manifests?", count))
            .show_default(true)
            .default(true)
            .interact()
            .unwrap_or_else(|e| {
                warn!("Failed to get user input: {}", e);
                false
            })
    }

    async fn download_all(&self, pending: &[PathBuf]) -> DownloadReport {
        let provider = ReqwestSessionProvider::new(HttpConfig::default(), self.config.headers.clone());
        let downloader = Downloader::new(self.config.downloader_config(true), provider);
        let download_dir = self.config.download_dir();

        let mut total = DownloadReport::default();
        for path in pending {
            match resume_manifest(&downloader, path, &download_dir).await {
                Ok(report) => {
                    total.succeeded += report.succeeded;
                    total.failed += report.failed;
                    if report.failed > 0 {
                        warn!("Keeping {} for a later retry.", path.display());
                    }
                }
                Err(e) => error!("Could not resume {}: {}", path.display(), e),
            }
        }
        total
    }
}
