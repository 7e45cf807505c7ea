//! Configuration file handling.
//!
//! Loads and saves hexprov configuration from a TOML file at:
//! - Linux: `~/.config/hexprov/config.toml`
//! - macOS: `~/Library/Application Support/hexprov/config.toml`
//! - Windows: `%APPDATA%\hexprov\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! cache_ttl_hours = 24
//! default_format = "table"
//! lockfile = "hexprov.lock"
//! parallel = true
//! registry_api_url = "https://hex.pm/api"
//! registry_repo_url = "https://repo.hex.pm"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long to cache registry responses, in hours.
    ///
    /// Default: 24 hours
    pub cache_ttl_hours: u64,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Path of the absolution lockfile.
    ///
    /// Default: "hexprov.lock" in the working directory
    pub lockfile: PathBuf,

    /// Whether to check packages concurrently by default.
    ///
    /// Default: true
    pub parallel: bool,

    /// Base URL of the registry API (package metadata).
    pub registry_api_url: String,

    /// Base URL of the registry repository (tarballs).
    pub registry_repo_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            default_format: "table".to_string(),
            lockfile: PathBuf::from(crate::lockfile::DEFAULT_LOCKFILE),
            parallel: true,
            registry_api_url: "https://hex.pm/api".to_string(),
            registry_repo_url: "https://repo.hex.pm".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file, or defaults if the file
    /// doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration, creating the parent directory if needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hexprov")
            .join("config.toml")
    }

    /// The default configuration rendered as TOML, for `config --init`
    /// output.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.default_format, "table");
        assert_eq!(config.lockfile, PathBuf::from("hexprov.lock"));
        assert!(config.parallel);
        assert_eq!(config.registry_api_url, "https://hex.pm/api");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("default_format = \"json\"").unwrap();
        assert_eq!(config.default_format, "json");
        assert_eq!(config.cache_ttl_hours, 24);
        assert!(config.parallel);
    }

    #[test]
    fn test_default_config_round_trips() {
        let rendered = Config::generate_default_config();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.default_format, Config::default().default_format);
    }
}
