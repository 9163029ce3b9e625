//! Configuration types for esaudit.
//!
//! Configuration is loaded from a single YAML file (esaudit.yaml) and resolved
//! once into typed values. Services never re-read configuration per call.
//!
//! ```yaml
//! threshold: 30
//! drivers:
//!   elastic:
//!     hosts: ["https://localhost:9200"]
//!     index: audits
//!     date_format: "yyyy-MM-dd HH:mm:ss"
//! ```

pub mod date_format;
pub mod elastic;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use date_format::{DEFAULT_DATE_FORMAT, DateFormat};
pub use elastic::ElasticConfig;

/// Largest accepted retention threshold, in days (1000 years).
pub const MAX_THRESHOLD_DAYS: u32 = 365_000;

/// Complete esaudit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EsAuditConfig {
    /// Retention threshold in days. `0` disables pruning.
    #[serde(default)]
    pub threshold: u32,

    /// Storage driver settings.
    #[serde(default)]
    pub drivers: DriversConfig,
}

/// Storage driver settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriversConfig {
    /// Elasticsearch driver.
    #[serde(default)]
    pub elastic: ElasticConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid date format '{pattern}': {reason}")]
    InvalidDateFormat { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EsAuditConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load, then validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold > MAX_THRESHOLD_DAYS {
            return Err(ConfigError::Config(format!(
                "threshold must be at most {} days, got {}",
                MAX_THRESHOLD_DAYS, self.threshold
            )));
        }
        self.drivers.elastic.validate()
    }

    /// Whether retention pruning is enabled.
    pub fn retention_enabled(&self) -> bool {
        self.threshold > 0
    }
}
