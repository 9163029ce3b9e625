//! Index commands.
//!
//! `esaudit mapping` - Print the mapping the index is created with.
//! `esaudit index create|delete|exists` - Manage the audit index.

use anyhow::Result;
use esaudit_core::EsAuditConfig;
use esaudit_driver::MappingModel;
use serde_json::{Value, json};

use super::{connect, print_json};

pub fn mapping_body(config: &EsAuditConfig) -> Result<Value> {
    Ok(MappingModel::from_config(&config.drivers.elastic)?.index_body())
}

pub fn mapping(config: &EsAuditConfig) -> Result<()> {
    print_json(&mapping_body(config)?)
}

pub async fn create(config: &EsAuditConfig) -> Result<()> {
    let driver = connect(config)?;
    let created = driver.indices().create_index().await?;
    print_json(&json!({ "index": driver.indices().index(), "acknowledged": created }))
}

pub async fn delete(config: &EsAuditConfig) -> Result<()> {
    let driver = connect(config)?;
    let deleted = driver.indices().delete_index().await?;
    print_json(&json!({ "index": driver.indices().index(), "acknowledged": deleted }))
}

pub async fn exists(config: &EsAuditConfig) -> Result<()> {
    let driver = connect(config)?;
    let exists = driver.indices().index_exists().await?;
    print_json(&json!({ "index": driver.indices().index(), "exists": exists }))
}
