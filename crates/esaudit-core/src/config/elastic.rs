//! Elasticsearch driver configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::date_format::{DEFAULT_DATE_FORMAT, DateFormat};
use super::ConfigError;

/// Configuration for the search engine that stores audit records.
///
/// Credentials can be given directly or through an environment variable;
/// the environment variable takes precedence when it is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticConfig {
    /// Cluster endpoints. Requests go to the first one.
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,

    /// Name of the shared audit index.
    #[serde(default = "default_index")]
    pub index: String,

    /// Engine date pattern used for every date field in the mapping.
    #[serde(default = "default_date_format", alias = "dateFormat")]
    pub date_format: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Whether to send HTTP basic auth credentials.
    #[serde(default, alias = "useBasicAuth")]
    pub use_basic_auth: bool,

    /// Basic auth user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable containing the basic auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Whether to trust an additional CA bundle.
    #[serde(default, alias = "useCaCert")]
    pub use_ca_cert: bool,

    /// Path to the PEM encoded CA bundle.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "certPath")]
    pub cert_path: Option<PathBuf>,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            index: default_index(),
            date_format: default_date_format(),
            timeout_seconds: default_timeout_seconds(),
            use_basic_auth: false,
            username: None,
            password: None,
            password_env: None,
            use_ca_cert: false,
            cert_path: None,
        }
    }
}

impl ElasticConfig {
    /// Parse the configured date pattern.
    pub fn date_format(&self) -> Result<DateFormat, ConfigError> {
        DateFormat::parse(&self.date_format)
    }

    /// The host requests are sent to.
    pub fn primary_host(&self) -> Option<&str> {
        self.hosts.first().map(|h| h.trim_end_matches('/'))
    }

    /// Resolve the basic auth password, preferring the environment variable.
    pub fn resolve_password(&self) -> Option<String> {
        if let Some(env_var) = &self.password_env
            && let Ok(password) = std::env::var(env_var)
        {
            return Some(password);
        }
        self.password.clone()
    }

    /// Check the settings that must hold before any request is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_host().is_none_or(str::is_empty) {
            return Err(ConfigError::Config(
                "drivers.elastic.hosts must contain at least one host".to_string(),
            ));
        }

        if self.index.is_empty() {
            return Err(ConfigError::Config(
                "drivers.elastic.index must not be empty".to_string(),
            ));
        }
        if self.index != self.index.to_lowercase() || self.index.starts_with(['_', '-', '+']) {
            return Err(ConfigError::Config(format!(
                "drivers.elastic.index '{}' is not a valid index name",
                self.index
            )));
        }

        self.date_format()?;

        if self.use_basic_auth {
            if self.username.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::Config(
                    "drivers.elastic.username is required when use_basic_auth is set".to_string(),
                ));
            }
            if self.password.is_none() && self.password_env.is_none() {
                return Err(ConfigError::Config(
                    "drivers.elastic.password or password_env is required when use_basic_auth is set"
                        .to_string(),
                ));
            }
        }

        if self.use_ca_cert && self.cert_path.is_none() {
            return Err(ConfigError::Config(
                "drivers.elastic.cert_path is required when use_ca_cert is set".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_hosts() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_index() -> String {
    "audits".to_string()
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ElasticConfig::default();
        assert_eq!(config.primary_host(), Some("http://localhost:9200"));
        assert_eq!(config.index, "audits");
        assert_eq!(config.date_format, "yyyy-MM-dd HH:mm:ss");
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_index_name() {
        let config = ElasticConfig {
            index: "Audits".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ElasticConfig {
            index: "_audits".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_basic_auth_requires_credentials() {
        let mut config = ElasticConfig {
            use_basic_auth: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.username = Some("elastic".to_string());
        assert!(config.validate().is_err());

        config.password = Some("changeme".to_string());
        config.validate().unwrap();
        assert_eq!(config.resolve_password(), Some("changeme".to_string()));
    }

    #[test]
    fn test_password_env_takes_precedence() {
        // SAFETY: We're in a test and controlling the environment
        unsafe {
            std::env::set_var("ESAUDIT_TEST_ELASTIC_PASSWORD", "from-env");
        }

        let config = ElasticConfig {
            password: Some("inline".to_string()),
            password_env: Some("ESAUDIT_TEST_ELASTIC_PASSWORD".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_password(), Some("from-env".to_string()));

        // SAFETY: Cleanup in test
        unsafe {
            std::env::remove_var("ESAUDIT_TEST_ELASTIC_PASSWORD");
        }
        assert_eq!(config.resolve_password(), Some("inline".to_string()));
    }

    #[test]
    fn test_ca_cert_requires_path() {
        let config = ElasticConfig {
            use_ca_cert: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_date_format() {
        let config = ElasticConfig {
            date_format: "epoch_millis".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDateFormat { .. })
        ));
    }
}
