//! Configuration management for the capture engine
//!
//! Handles TOML configuration parsing, defaults and validation

use crate::constants::*;
use crate::models::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Capture engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Events buffered per queue; 0 means each event is handed to the
    /// consumer before the next one is processed
    pub queue_capacity: usize,
    /// Errors buffered before further errors are dropped
    pub error_queue_capacity: usize,
    /// Receive buffer for one datagram, in bytes
    pub receive_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_queue_capacity: DEFAULT_ERROR_QUEUE_CAPACITY,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Default configuration file location (`<config_dir>/procevents/config.toml`)
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .context("Could not determine the user configuration directory")?;
        Ok(base.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path` if given, else from the default location if that
    /// file exists, else fall back to defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_config_path() {
            Ok(default_path) if default_path.exists() => Self::load_from_file(&default_path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.queue_capacity > QUEUE_CAPACITY_MAX {
            return Err(ConfigError::InvalidQueueCapacity(self.queue_capacity));
        }
        if self.error_queue_capacity == 0 || self.error_queue_capacity > QUEUE_CAPACITY_MAX {
            return Err(ConfigError::InvalidErrorQueueCapacity(self.error_queue_capacity));
        }
        if !(RECEIVE_BUFFER_MIN..=RECEIVE_BUFFER_MAX).contains(&self.receive_buffer_size) {
            return Err(ConfigError::InvalidReceiveBufferSize(self.receive_buffer_size));
        }
        Ok(())
    }
}
