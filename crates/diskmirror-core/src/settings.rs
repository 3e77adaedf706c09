//! Persistent user settings for diskmirror
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux/macOS: `~/.config/diskmirror/diskmirror_config.toml`
//! - Windows: `%APPDATA%\diskmirror\diskmirror_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [copy]
//! block_size = "1M"
//! workers = 8
//!
//! [behavior]
//! skip_confirmation = false
//! assume_sector_size = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "diskmirror_config.toml";

/// Application name for config directory
const APP_NAME: &str = "diskmirror";

/// User settings loaded from the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Copy operation settings
    pub copy: CopySettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,
}

/// Settings for copy operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CopySettings {
    /// Default block size (e.g., "1M", "4M", "512K")
    pub block_size: String,

    /// Default number of worker threads
    pub workers: usize,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            block_size: "1M".to_string(),
            workers: crate::config::DEFAULT_WORKERS,
        }
    }
}

/// General behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Whether to skip confirmation prompts by default
    pub skip_confirmation: bool,

    /// Whether to accept the 4096-byte sector-size fallback without
    /// prompting when the destination's sector size cannot be probed
    pub assume_sector_size: bool,
}

impl Settings {
    /// Load settings from the default location
    ///
    /// Returns default settings if the file doesn't exist or can't be
    /// parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to the default location, creating the directory if
    /// needed
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// I/O error reading or writing the configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.copy.block_size, "1M");
        assert_eq!(settings.copy.workers, 8);
        assert!(!settings.behavior.skip_confirmation);
        assert!(!settings.behavior.assume_sector_size);
    }

    #[test]
    fn test_load_from_missing_path_uses_defaults() {
        let settings = Settings::load_from_path(Some(PathBuf::from("/nonexistent/config.toml")));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[copy]\nblock_size = \"4M\"\nworkers = 16\n\n[behavior]\nassume_sector_size = true"
        )
        .unwrap();

        let settings = Settings::load_from_path(Some(file.path().to_path_buf()));
        assert_eq!(settings.copy.block_size, "4M");
        assert_eq!(settings.copy.workers, 16);
        assert!(settings.behavior.assume_sector_size);
        assert!(!settings.behavior.skip_confirmation);
    }

    #[test]
    fn test_load_from_malformed_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml {{{{").unwrap();

        let settings = Settings::load_from_path(Some(file.path().to_path_buf()));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = Settings::default();
        settings.copy.workers = 32;
        settings.behavior.skip_confirmation = true;

        let serialized = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, settings);
    }
}
