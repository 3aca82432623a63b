//! Configuration module
//!
//! Handles the device profile and transport settings

mod settings;

pub use settings::{AppConfig, ConfigError, DeviceKind, DeviceProfile};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "switchlink", "Switchlink")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default configuration file path
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Initialize application directories
pub fn init_directories() -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
