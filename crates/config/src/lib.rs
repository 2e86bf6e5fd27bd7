#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for assetpack
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/assetpack/config.toml)
//! - Environment variables
//! - CLI flags
//!
//! It also owns the asset manifest, the data-driven list of what to package.

pub mod constants;
pub mod manifest;

pub use manifest::{AssetManifest, BinaryAsset, VoiceAsset};

use assetpack_errors::{ConfigError, Error};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub package: PackageConfig,
}

/// Download cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory under the output root holding cached downloads
    #[serde(default = "default_cache_subdir")]
    pub subdir: String,
}

/// Archive output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64, // seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64, // seconds
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64, // seconds
}

/// What to do with a voice file whose name maps to no known archive entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFilePolicy {
    #[default]
    Error,
    Skip,
}

impl std::str::FromStr for UnknownFilePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "skip" => Ok(Self::Skip),
            _ => Err(ConfigError::InvalidValue {
                field: "package.unknown_files".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Package layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    #[serde(default)]
    pub unknown_files: UnknownFilePolicy,
    /// Command run inside each finished package directory, e.g. `["go", "build", "."]`
    #[serde(default)]
    pub build_command: Option<Vec<String>>,
}

// Default implementations

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            subdir: default_cache_subdir(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: 300, // 5 minutes
            connect_timeout: 30,
            retries: 0, // opt-in
            retry_delay: 1, // 1 second
        }
    }
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            unknown_files: UnknownFilePolicy::Error,
            build_command: None,
        }
    }
}

// Default value functions for serde
fn default_cache_subdir() -> String {
    constants::DEFAULT_CACHE_SUBDIR.to_string()
}

fn default_compression_level() -> i32 {
    constants::MAX_COMPRESSION_LEVEL
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    0
}

fn default_retry_delay() -> u64 {
    1 // 1 second
}

fn default_name_prefix() -> String {
    constants::DEFAULT_NAME_PREFIX.to_string()
}

impl NetworkConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir.join("assetpack").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid TOML, or
    /// holds values outside their accepted range.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if fs::try_exists(&config_path).await.unwrap_or(false) {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // ASSETPACK_CACHE_SUBDIR
        if let Ok(subdir) = std::env::var("ASSETPACK_CACHE_SUBDIR") {
            self.cache.subdir = subdir;
        }

        // ASSETPACK_COMPRESSION_LEVEL
        if let Ok(level) = std::env::var("ASSETPACK_COMPRESSION_LEVEL") {
            self.archive.compression_level =
                level.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "ASSETPACK_COMPRESSION_LEVEL".to_string(),
                    value: level,
                })?;
        }

        // ASSETPACK_TIMEOUT
        if let Ok(timeout) = std::env::var("ASSETPACK_TIMEOUT") {
            self.network.timeout = timeout.parse().map_err(|_| ConfigError::InvalidValue {
                field: "ASSETPACK_TIMEOUT".to_string(),
                value: timeout,
            })?;
        }

        // ASSETPACK_RETRIES
        if let Ok(retries) = std::env::var("ASSETPACK_RETRIES") {
            self.network.retries = retries.parse().map_err(|_| ConfigError::InvalidValue {
                field: "ASSETPACK_RETRIES".to_string(),
                value: retries,
            })?;
        }

        // ASSETPACK_UNKNOWN_FILES
        if let Ok(policy) = std::env::var("ASSETPACK_UNKNOWN_FILES") {
            self.package.unknown_files = policy.parse()?;
        }

        self.validate()
    }

    /// Check values that serde cannot constrain on its own
    ///
    /// # Errors
    ///
    /// Returns an error naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), Error> {
        let level = self.archive.compression_level;
        if !(constants::MIN_COMPRESSION_LEVEL..=constants::MAX_COMPRESSION_LEVEL).contains(&level)
        {
            return Err(ConfigError::InvalidValue {
                field: "archive.compression_level".to_string(),
                value: level.to_string(),
            }
            .into());
        }

        if self.cache.subdir.is_empty() || Path::new(&self.cache.subdir).is_absolute() {
            return Err(ConfigError::InvalidValue {
                field: "cache.subdir".to_string(),
                value: self.cache.subdir.clone(),
            }
            .into());
        }

        if let Some(command) = &self.package.build_command {
            if command.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "package.build_command".to_string(),
                    value: "[]".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Cache directory for a given output root
    #[must_use]
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.cache.subdir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.archive.compression_level, 22);
        assert_eq!(config.cache.subdir, "assetpack.cache");
        assert_eq!(config.package.unknown_files, UnknownFilePolicy::Error);
        assert_eq!(config.network.retries, 0);
    }

    #[test]
    fn test_compression_level_out_of_range() {
        let mut config = Config::default();
        config.archive.compression_level = 23;
        assert!(config.validate().is_err());
        config.archive.compression_level = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_dir() {
        let config = Config::default();
        assert_eq!(
            config.cache_dir(Path::new("/out")),
            PathBuf::from("/out/assetpack.cache")
        );
    }
}
