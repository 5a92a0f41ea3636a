//! Structured logging for the Threads downloader
//!
//! This module provides functionality for:
//! 1. Filtering by `RUST_LOG`, falling back to the configured level
//! 2. Writing human-readable logs to the terminal
//! 3. Writing logs to a daily rotating file in JSON or line format

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::ChronoUtc},
    prelude::*,
    EnvFilter, Layer, Registry,
};

use crate::config_loader::Logging;

const LOG_FILE_PREFIX: &str = "threads_downloader.log";

/// Error types for logging
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),
}

/// Result type for logging operations
pub type LoggerResult<T> = Result<T, LoggerError>;

/// Line layout of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl LogFormat {
    /// Anything other than `json` is plain text.
    pub fn parse(format: &str) -> Self {
        if format.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Plain
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn build_filter(level: &str) -> LoggerResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| LoggerError::Logging(e.to_string()))
}

fn file_layer(log_dir: &Path, format: LogFormat) -> LoggerResult<(BoxedLayer, WorkerGuard)> {
    fs::create_dir_all(log_dir)?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_timer(ChronoUtc::rfc_3339())
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
        LogFormat::Plain => fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .with_timer(ChronoUtc::rfc_3339())
            .with_span_events(FmtSpan::CLOSE)
            .boxed(),
    };
    Ok((layer, guard))
}

/// Installs the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be held
/// for the lifetime of the program.
pub fn init_logger(config: &Logging, log_dir: &Path) -> LoggerResult<Option<WorkerGuard>> {
    let filter = build_filter(&config.log_level)?;
    let format = LogFormat::parse(&config.log_format);

    let mut layers: Vec<BoxedLayer> = vec![fmt::layer().with_target(false).without_time().boxed()];
    let guard = if config.log_to_file {
        let (layer, guard) = file_layer(log_dir, format)?;
        layers.push(layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggerError::Logging(e.to_string()))?;

    info!(
        log_format = %config.log_format,
        log_level = %config.log_level,
        log_to_file = config.log_to_file,
        "Logger initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("plain"), LogFormat::Plain);
        assert_eq!(LogFormat::parse(""), LogFormat::Plain);
    }

    #[test]
    fn test_file_layer_creates_log_directory() {
        let dir = tempdir().unwrap();
        let log_dir = dir.path().join("logs").join("nested");
        let (_layer, _guard) = file_layer(&log_dir, LogFormat::Json).unwrap();
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_configured_level_is_accepted() {
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("threads_downloader=trace,reqwest=warn").is_ok());
    }
}
