//! Application settings

use crate::core::connection::ConnectionSettings;
use crate::core::transport::Transport;
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
        source: std::io::Error,
    },

    /// File content is not valid configuration
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Which protocol the device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Linear channel switcher
    #[default]
    Switcher,
    /// Matrix crosspoint
    Matrix,
}

/// Device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Protocol family
    pub kind: DeviceKind,
    /// Open the connection as soon as the device is created
    pub auto_open: bool,
    /// Pause between bootstrap queries in milliseconds
    pub settle_delay_ms: u64,
    /// Correlation ticket lifetime in milliseconds
    pub ticket_ttl_ms: u64,
    /// Most correlation tickets held at once
    pub ticket_capacity: usize,
    /// Traffic history entries kept
    pub history_capacity: usize,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            kind: DeviceKind::default(),
            auto_open: false,
            settle_delay_ms: 150,
            ticket_ttl_ms: 2000,
            ticket_capacity: 64,
            history_capacity: 256,
        }
    }
}

impl DeviceProfile {
    /// Bootstrap settle delay
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Connection tunables derived from this profile
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ticket_capacity: self.ticket_capacity,
            ticket_ttl: Duration::from_millis(self.ticket_ttl_ms),
            history_capacity: self.history_capacity,
            ..ConnectionSettings::default()
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Device settings
    pub device: DeviceProfile,
    /// Transport settings
    pub transport: Transport,
}

impl AppConfig {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Load config from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        super::init_directories().map_err(|source| ConfigError::Io {
            path: super::config_dir().unwrap_or_default(),
            source,
        })?;
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
