//! # Configuration Management Module
//!
//! Recorder settings stored in a platform-appropriate location.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `save_interval_ms`: Minimum time between time-triggered flushes
//! - `app_name`: Owner tag used when powering the heart-rate sensor
//! - `diagnostic_every`: Log a diagnostic line every Nth buffered sample
//! - `max_buffer_samples`: Buffer capacity before an early flush
//! - `batch_prefix`: Name prefix of persisted batch files
//! - `data_dir`: Where batches and the settings record live
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/pulsewatch/config.toml
//! - Linux: ~/.config/pulsewatch/config.toml
//! - Windows: %APPDATA%\pulsewatch\config.toml

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub save_interval_ms: i64,
    pub app_name: String,
    pub diagnostic_every: usize,
    pub max_buffer_samples: usize,
    pub batch_prefix: String,
    pub data_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            save_interval_ms: 5 * 60 * 1000,
            app_name: "pulsewatch".to_string(),
            diagnostic_every: 10,
            max_buffer_samples: 4096,
            batch_prefix: "pw".to_string(),
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulsewatch")
            .join("config.toml")
    }

    /// Directory holding batches and the settings record
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pulsewatch")
        })
    }

    /// Load config from the default location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Self = toml::from_str(&contents).map_err(ConfigError::ParseFailed)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, create default
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::config_path())
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string).map_err(ConfigError::WriteFailed)?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.save_interval_ms < 0 {
            return Err(ConfigError::Invalid(format!(
                "save_interval_ms must not be negative (got {})",
                self.save_interval_ms
            )));
        }
        if self.max_buffer_samples == 0 {
            return Err(ConfigError::Invalid("max_buffer_samples must be at least 1".to_string()));
        }
        if self.batch_prefix.is_empty() || self.batch_prefix.contains(['/', '\\', '.']) {
            return Err(ConfigError::Invalid(format!(
                "batch_prefix {:?} is not a plain file name prefix",
                self.batch_prefix
            )));
        }
        Ok(())
    }
}
