//! Logging backend for the binary
//!
//! The library only talks to the `log` facade; the binary installs
//! `env_logger` writing to stderr so stdout carries nothing but events.

use anyhow::{anyhow, Result};
use env_logger::{Builder, Target};
use log::LevelFilter;

/// Level implied by the command-line flags, if they imply one
pub fn level_for(verbosity: u8, quiet: bool) -> Option<LevelFilter> {
    match (quiet, verbosity) {
        (true, _) => Some(LevelFilter::Error),
        (false, 0) => None,
        (false, 1) => Some(LevelFilter::Info),
        (false, _) => Some(LevelFilter::Debug),
    }
}

/// Install the global logger.
///
/// `RUST_LOG` is honored; `-v`/`-q` override it. Without either the level
/// is `warn`.
pub fn init_logger(verbosity: u8, quiet: bool) -> Result<()> {
    let mut builder = Builder::new();
    builder.target(Target::Stderr).format_timestamp_millis();

    match (std::env::var("RUST_LOG"), level_for(verbosity, quiet)) {
        (_, Some(level)) => {
            builder.filter_level(level);
        }
        (Ok(filters), None) => {
            builder.parse_filters(&filters);
        }
        (Err(_), None) => {
            builder.filter_level(LevelFilter::Warn);
        }
    }

    builder
        .try_init()
        .map_err(|e| anyhow!("Failed to set logger: {}", e))
}
