//! Application settings

use crate::core::connection::ManagerSettings;
use crate::core::logger::{Logger, SessionLogger};
use crate::core::reader::ReaderSettings;
use crate::core::simulator::SimulationConfig;
use crate::core::transport::PortConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No platform configuration directory
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("Config file {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values are out of range
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default serial port settings
    pub serial: PortConfig,
    /// Reader and shutdown tuning
    pub reader: ReaderConfig,
    /// Simulation parameters
    pub simulation: SimulationConfig,
    /// Session log settings
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load config from the default location; a missing file yields defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serial
            .validate()
            .and_then(|()| self.simulation.validate())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.reader.chunk_size == 0 || self.reader.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "reader chunk_size and max_line_length must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Connection manager settings derived from this config
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            close_timeout: Duration::from_millis(self.reader.close_timeout_ms),
            reader: ReaderSettings {
                backoff: Duration::from_millis(self.reader.backoff_ms),
                chunk_size: self.reader.chunk_size,
                max_line_length: self.reader.max_line_length,
            },
        }
    }

    /// Open the session logger described by this config
    ///
    /// Never fails: an unusable directory yields a disabled logger.
    pub fn open_logger(&self) -> Logger {
        if !self.logging.enabled {
            return SessionLogger::disabled().shared();
        }
        match self.logging.resolve_directory() {
            Some(dir) => SessionLogger::create_or_disabled(&dir, &self.logging.file_prefix).shared(),
            None => {
                tracing::warn!("No log directory available, session log disabled");
                SessionLogger::disabled().shared()
            }
        }
    }
}

/// Reader and shutdown tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Pause after a read error, in milliseconds
    pub backoff_ms: u64,
    /// How long close waits for the reader, in milliseconds
    pub close_timeout_ms: u64,
    /// Bytes requested per read
    pub chunk_size: usize,
    /// Longest unterminated line kept before it is flushed
    pub max_line_length: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let manager = ManagerSettings::default();
        Self {
            backoff_ms: manager.reader.backoff.as_millis() as u64,
            close_timeout_ms: manager.close_timeout.as_millis() as u64,
            chunk_size: manager.reader.chunk_size,
            max_line_length: manager.reader.max_line_length,
        }
    }
}

/// Session log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a session log
    pub enabled: bool,
    /// Log directory; the platform data directory when unset
    pub directory: Option<PathBuf>,
    /// File name prefix
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            file_prefix: "serial".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Directory the session log goes to
    pub fn resolve_directory(&self) -> Option<PathBuf> {
        self.directory.clone().or_else(super::log_dir)
    }
}
