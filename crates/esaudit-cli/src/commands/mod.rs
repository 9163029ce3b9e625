//! CLI command implementations for esaudit.

pub mod index;
pub mod retention;
pub mod search;

use anyhow::{Context, Result};
use esaudit_adapter_http::ElasticsearchClient;
use esaudit_core::{EsAuditConfig, Identifier};
use esaudit_driver::{AuditOrchestrator, NoUserResolver};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Load and validate the configuration. A missing file falls back to the
/// defaults, which target a local cluster.
pub fn load_config(path: &Path) -> Result<EsAuditConfig> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Configuration file not found, using defaults");
        let config = EsAuditConfig::default();
        config.validate()?;
        return Ok(config);
    }

    EsAuditConfig::load(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))
}

/// Connect the audit driver to the configured cluster.
pub fn connect(config: &EsAuditConfig) -> Result<AuditOrchestrator> {
    let client = ElasticsearchClient::new(&config.drivers.elastic)
        .context("Failed to create search engine client")?;
    let driver = AuditOrchestrator::new(Arc::new(client), config, Arc::new(NoUserResolver))?;
    Ok(driver)
}

/// Numeric ids are matched as numbers, anything else as text.
pub fn parse_identifier(raw: &str) -> Identifier {
    raw.parse::<i64>()
        .map(Identifier::Int)
        .unwrap_or_else(|_| Identifier::Text(raw.to_string()))
}

pub fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("42"), Identifier::Int(42));
        assert_eq!(parse_identifier("-1"), Identifier::Int(-1));
        assert_eq!(parse_identifier("p-42"), Identifier::Text("p-42".to_string()));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("esaudit.yaml")).unwrap();
        assert_eq!(config.drivers.elastic.index, "audits");
        assert_eq!(config.threshold, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "drivers:\n  elastic:\n    index: Audits").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("not a valid index name"));
    }

    #[test]
    fn test_connect_builds_driver() {
        let config = EsAuditConfig::from_yaml("threshold: 7").unwrap();
        let driver = connect(&config).unwrap();
        assert_eq!(driver.documents().threshold_days(), 7);
        assert_eq!(driver.indices().index(), "audits");
    }
}
