//! Configuration module for the stampt CLI.
//!
//! A `stampt.toml` file carries the metadata construction parameters used
//! to rebuild tables from an artifact, plus output defaults.
//!
//! ```toml
//! [metadata]
//! ambiguity_policy = "explicit-only"
//! strict_layouts = true
//!
//! [metadata.tag_scheme]
//! low_tag_bits = 3
//!
//! [output]
//! format = "json"
//! ```

use dirs::{config_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use stampgc::MetadataConfig;

use crate::commands::common::OutputFormat;
use crate::error::{Result, StamptError};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "stampt.toml";

/// Application configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Parameters handed to the metadata builder.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Output defaults.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Format used when a command is not given `--format`.
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Searches for configuration in the following order:
    /// 1. Current directory
    /// 2. `~/.config/stampt`
    /// 3. System configuration directory
    ///
    /// Returns the default configuration if no config file is found.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StamptError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| StamptError::Config(format!("Failed to parse configuration: {}", e)))?;

        config
            .metadata
            .validate()
            .map_err(|e| StamptError::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| StamptError::Config(format!("Failed to serialize configuration: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    fn find_config_file() -> Option<PathBuf> {
        let current = PathBuf::from(CONFIG_FILE_NAME);
        if current.exists() {
            return Some(current);
        }

        let home = home_dir().map(|dir| dir.join(".config").join("stampt").join(CONFIG_FILE_NAME));
        let system = config_dir().map(|dir| dir.join("stampt").join(CONFIG_FILE_NAME));

        [home, system].into_iter().flatten().find(|path| path.exists())
    }
}
