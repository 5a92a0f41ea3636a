//! Threads profile media downloader.
//!
//! [`threads`] holds the scroll collector, the concurrent downloader and the
//! per-profile runner; [`config_loader`] and [`logger`] carry the settings
//! and logging shared by the binary.

pub mod config_loader;
pub mod logger;
pub mod threads;
