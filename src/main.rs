use std::env::consts::{
    ARCH, DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX, EXE_EXTENSION, EXE_SUFFIX, FAMILY, OS,
};
use std::env::current_dir;

use anyhow::{Context, Error};
use tracing::trace;

use threads_downloader::config_loader::ConfigManager;
use threads_downloader::logger::init_logger;

use crate::program::Program;

mod program;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config_dir = current_dir().context("Failed to get working directory")?;
    let config_manager = ConfigManager::new(&config_dir)?;
    let config = config_manager.get_app_config();

    // Held until exit so the file writer flushes.
    let _guard = init_logger(&config.logging, &config.log_dir())?;
    log_system_information();

    config.validate()?;
    Program::new(config).run().await
}

/// Logs important information about the system being used.
fn log_system_information() {
    trace!("Printing system information out into log for debug purposes...");
    trace!("ARCH:           \"{}\"", ARCH);
    trace!("DLL_EXTENSION:  \"{}\"", DLL_EXTENSION);
    trace!("DLL_PREFIX:     \"{}\"", DLL_PREFIX);
    trace!("DLL_SUFFIX:     \"{}\"", DLL_SUFFIX);
    trace!("EXE_EXTENSION:  \"{}\"", EXE_EXTENSION);
    trace!("EXE_SUFFIX:     \"{}\"", EXE_SUFFIX);
    trace!("FAMILY:         \"{}\"", FAMILY);
    trace!("OS:             \"{}\"", OS);
}
