//! Configuration management
//!
//! Handles loading and saving the mirror configuration file, stored in TOML
//! format at ~/.config/s3-mirror/config.toml by default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::multipart::{MultipartConfig, DEFAULT_CONCURRENCY, DEFAULT_PART_SIZE};

/// Current configuration schema version
pub const SCHEMA_VERSION: u32 = 1;

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_threshold() -> u64 {
    DEFAULT_PART_SIZE
}

/// Connection details for an S3-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint URL; None uses the ambient AWS configuration
    #[serde(default)]
    pub endpoint: Option<String>,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Use path-style addressing (required by most non-AWS backends)
    #[serde(default)]
    pub force_path_style: bool,
}

impl ConnectionConfig {
    /// Validate the endpoint URL, when one is set
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            url::Url::parse(endpoint)?;
        }
        Ok(())
    }
}

/// Multipart transfer settings, as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultipartSettings {
    /// Part size in bytes
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Number of concurrent part uploads
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// File size at which uploads switch to multipart, in bytes
    #[serde(default = "default_threshold")]
    pub threshold: u64,
}

impl Default for MultipartSettings {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            concurrency: default_concurrency(),
            threshold: default_threshold(),
        }
    }
}

impl MultipartSettings {
    /// Convert into clamped runtime settings
    pub fn to_config(&self) -> MultipartConfig {
        MultipartConfig::new()
            .part_size(self.part_size)
            .concurrency(self.concurrency)
            .threshold(self.threshold)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Schema version for migration support
    pub schema_version: u32,

    /// Bucket all mirror operations target by default
    pub bucket: String,

    /// Local directory remote keys are projected onto
    pub mirror_root: PathBuf,

    /// Endpoint connection details; None uses ambient AWS configuration
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,

    /// Multipart transfer settings
    #[serde(default)]
    pub multipart: MultipartSettings,
}

impl MirrorConfig {
    /// Create a configuration from a bucket and mirror root
    pub fn new(bucket: impl Into<String>, mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            bucket: bucket.into(),
            mirror_root: mirror_root.into(),
            connection: None,
            multipart: MultipartSettings::default(),
        }
    }

    /// Attach connection details
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = Some(connection);
        self
    }
}

/// Configuration manager handles loading and saving config
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the default config path
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not determine config directory".into()))?;
        let config_path = config_dir.join("s3-mirror").join("config.toml");
        Ok(Self { config_path })
    }

    /// Create a ConfigManager with a custom path (useful for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk
    ///
    /// Rejects configuration written by a newer schema version.
    pub fn load(&self) -> Result<MirrorConfig> {
        if !self.config_path.exists() {
            return Err(Error::Config(format!(
                "No configuration file at {}",
                self.config_path.display()
            )));
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        let config: MirrorConfig = toml::from_str(&content)?;

        if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "Configuration file version {} is newer than supported version {}",
                config.schema_version, SCHEMA_VERSION
            )));
        }
        if let Some(connection) = &config.connection {
            connection.validate()?;
        }

        Ok(config)
    }

    /// Save configuration to disk
    ///
    /// Creates parent directories if they don't exist.
    /// Sets file permissions to 600 (credentials may be present).
    pub fn save(&self, config: &MirrorConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.config_path, permissions)?;
        }

        Ok(())
    }
}
