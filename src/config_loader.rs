//! Configuration for the Threads downloader
//!
//! This module provides functionality for:
//! 1. Loading `config.toml`, writing defaults when it is missing
//! 2. Backing up an unreadable config and replacing it with defaults
//! 3. Turning the file sections into collector and downloader settings

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::threads::{
    CollectorConfig, DomContract, DownloaderConfig, HeaderProfiles, MediaKinds, RunnerSettings, StallKind,
    THREADS_HOME_URL,
};

const CONFIG_FILE: &str = "config.toml";

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Paths {
    pub download_directory: String,
    pub cookies_file: String,
    pub manifest_directory: String,
    pub log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Scroll {
    pub pause_ms: u64,
    pub jitter: f64,
    pub max_stall_count: usize,
    pub max_iterations: usize,
    pub strategy: StallKind,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Download {
    pub workers: usize,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub base_retry_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub paths: Paths,
    pub scroll: Scroll,
    pub media: MediaKinds,
    pub download: Download,
    pub headers: HeaderProfiles,
    pub dom: DomContract,
    pub logging: Logging,
}

impl Default for AppConfig {
    fn default() -> Self {
        let collector = CollectorConfig::default();
        let downloader = DownloaderConfig::default();
        Self {
            paths: Paths {
                download_directory: "./downloads".to_string(),
                cookies_file: "./cookies.json".to_string(),
                manifest_directory: "./manifests".to_string(),
                log_directory: "./logs".to_string(),
            },
            scroll: Scroll {
                pause_ms: collector.pause.as_millis() as u64,
                jitter: collector.jitter,
                max_stall_count: collector.max_stall_count,
                max_iterations: collector.max_iterations,
                strategy: collector.stall,
            },
            media: MediaKinds::ALL,
            download: Download {
                workers: downloader.workers,
                timeout_secs: downloader.request_timeout.as_secs(),
                max_retries: downloader.max_retries,
                base_retry_delay_ms: downloader.base_retry_delay.as_millis() as u64,
            },
            headers: HeaderProfiles::default(),
            dom: DomContract::default(),
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "plain".to_string(),
                log_to_file: true,
            },
        }
    }
}

impl AppConfig {
    /// Rejects settings the collector or downloader cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.collector_config(false)
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.downloader_config(false)
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.download.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "download.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn collector_config(&self, show_progress: bool) -> CollectorConfig {
        CollectorConfig {
            pause: Duration::from_millis(self.scroll.pause_ms),
            jitter: self.scroll.jitter,
            max_stall_count: self.scroll.max_stall_count,
            max_iterations: self.scroll.max_iterations,
            media_kinds: self.media,
            stall: self.scroll.strategy,
            dom: self.dom.clone(),
            show_progress,
        }
    }

    pub fn downloader_config(&self, show_progress: bool) -> DownloaderConfig {
        DownloaderConfig {
            workers: self.download.workers,
            request_timeout: Duration::from_secs(self.download.timeout_secs),
            max_retries: self.download.max_retries,
            base_retry_delay: Duration::from_millis(self.download.base_retry_delay_ms),
            show_progress,
            ..DownloaderConfig::default()
        }
    }

    /// Paths a [`crate::threads::ProfileRunner`] works with.
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            home_url: THREADS_HOME_URL.to_string(),
            download_dir: self.download_dir(),
            manifest_dir: Some(self.manifest_dir()),
            cookies_file: Some(self.cookies_file()),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.download_directory)
    }

    pub fn manifest_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.manifest_directory)
    }

    pub fn cookies_file(&self) -> PathBuf {
        PathBuf::from(&self.paths.cookies_file)
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.log_directory)
    }
}

// Config manager to handle the configuration file
pub struct ConfigManager {
    app_config: RwLock<AppConfig>,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Loads `config.toml` from `config_dir`, creating the directory and a
    /// default file when needed.
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            info!("Creating config directory: {}", config_dir.display());
            fs::create_dir_all(&config_dir)?;
        }

        let app_config = Self::load_app_config(&config_dir)?;
        let manager = Self {
            app_config: RwLock::new(app_config),
            config_dir,
        };
        manager.create_default_config()?;
        Ok(manager)
    }

    fn load_app_config(config_dir: &Path) -> ConfigResult<AppConfig> {
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            warn!("Config file not found: {}", config_path.display());
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                error!("Failed to parse {}: {}", CONFIG_FILE, e);
                info!("Backing up old config and creating new one with default values");

                if let Err(backup_err) = fs::rename(&config_path, config_path.with_extension("toml.backup")) {
                    warn!("Failed to backup old config: {}", backup_err);
                }

                let default_config = AppConfig::default();
                match toml::to_string_pretty(&default_config) {
                    Ok(toml_string) => match fs::write(&config_path, toml_string) {
                        Ok(()) => info!("Created new {} with default values", CONFIG_FILE),
                        Err(write_err) => error!("Failed to write new config file: {}", write_err),
                    },
                    Err(ser_err) => error!("Failed to serialize default config: {}", ser_err),
                }

                Ok(default_config)
            }
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn get_app_config(&self) -> AppConfig {
        self.app_config.read().clone()
    }

    pub fn save_app_config(&self, config: &AppConfig) -> ConfigResult<()> {
        let toml_string = toml::to_string_pretty(config).map_err(|e| ConfigError::TomlSer(e.to_string()))?;
        fs::write(self.config_path(), toml_string)?;
        *self.app_config.write() = config.clone();
        Ok(())
    }

    fn create_default_config(&self) -> ConfigResult<()> {
        if self.config_path().exists() {
            return Ok(());
        }
        info!("Writing default config to {}", self.config_path().display());
        self.save_app_config(&AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_writes_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("conf")).unwrap();

        assert!(manager.config_path().exists());
        assert_eq!(manager.get_app_config(), AppConfig::default());

        let written = fs::read_to_string(manager.config_path()).unwrap();
        let parsed: AppConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, AppConfig::default());
    }

    #[test]
    fn test_corrupt_config_is_backed_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[paths\nbroken").unwrap();

        let manager = ConfigManager::new(dir.path()).unwrap();

        assert_eq!(manager.get_app_config(), AppConfig::default());
        let backup = fs::read_to_string(dir.path().join("config.toml.backup")).unwrap();
        assert_eq!(backup, "[paths\nbroken");
    }

    #[test]
    fn test_saved_changes_survive_reload() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let mut config = manager.get_app_config();
        config.download.workers = 4;
        config.scroll.strategy = StallKind::Height;
        config.dom.end_markers = vec!["all caught up".to_string()];
        manager.save_app_config(&config).unwrap();

        let reloaded = ConfigManager::new(dir.path()).unwrap().get_app_config();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_conversions() {
        let mut config = AppConfig::default();
        config.scroll.pause_ms = 800;
        config.download.timeout_secs = 5;
        config.media.videos = false;

        let collector = config.collector_config(false);
        assert_eq!(collector.pause, Duration::from_millis(800));
        assert!(!collector.media_kinds.videos);
        assert!(!collector.show_progress);

        let settings = config.runner_settings();
        assert_eq!(settings.home_url, THREADS_HOME_URL);
        assert_eq!(settings.download_dir, PathBuf::from("./downloads"));
        assert_eq!(settings.manifest_dir, Some(PathBuf::from("./manifests")));
        assert_eq!(settings.cookies_file, Some(PathBuf::from("./cookies.json")));

        let downloader = config.downloader_config(true);
        assert_eq!(downloader.request_timeout, Duration::from_secs(5));
        assert_eq!(downloader.workers, 10);
        assert!(downloader.show_progress);
    }

    #[test]
    fn test_validation() {
        assert!(AppConfig::default().validate().is_ok());

        let mut config = AppConfig::default();
        config.download.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.scroll.max_stall_count = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.scroll.jitter = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.download.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.media = MediaKinds {
            images: false,
            videos: false,
        };
        assert!(config.validate().is_ok());
    }
}
