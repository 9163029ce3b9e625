//! Deletion and retention commands.
//!
//! `esaudit delete <id>` - Delete every audit document of an auditable id.
//! `esaudit prune --type T --id I` - Apply the retention threshold to one entity.

use anyhow::Result;
use esaudit_core::{AuditRecord, EsAuditConfig, Identifier};
use esaudit_driver::Auditable;
use serde_json::json;

use super::{connect, parse_identifier, print_json};

/// An auditable entity known only by type and id.
pub struct EntityRef {
    auditable_type: String,
    auditable_id: Identifier,
}

impl EntityRef {
    pub fn new(auditable_type: &str, auditable_id: &str) -> Self {
        Self {
            auditable_type: auditable_type.to_string(),
            auditable_id: parse_identifier(auditable_id),
        }
    }
}

impl Auditable for EntityRef {
    fn auditable_type(&self) -> &str {
        &self.auditable_type
    }

    fn auditable_id(&self) -> Identifier {
        self.auditable_id.clone()
    }

    fn to_record(&self) -> anyhow::Result<AuditRecord> {
        anyhow::bail!(
            "{} {} carries no change to record",
            self.auditable_type,
            self.auditable_id
        )
    }
}

pub async fn delete(config: &EsAuditConfig, auditable_id: &str, refresh: bool) -> Result<()> {
    let driver = connect(config)?;
    let auditable_id = parse_identifier(auditable_id);
    let deleted = driver
        .documents()
        .delete_audit_document(auditable_id.clone(), refresh)
        .await?;

    print_json(&json!({ "auditable_id": auditable_id, "acknowledged": deleted }))
}

pub async fn prune(
    config: &EsAuditConfig,
    auditable_type: &str,
    auditable_id: &str,
    dry_run: bool,
) -> Result<()> {
    let entity = EntityRef::new(auditable_type, auditable_id);

    if !config.retention_enabled() {
        tracing::warn!("Retention threshold is 0, nothing to prune");
        return print_json(&json!({ "threshold": 0, "pruned": false }));
    }

    let driver = connect(config)?;
    if dry_run {
        let Some(criteria) = driver.documents().stale_criteria(&entity)? else {
            return print_json(&json!({ "threshold": 0, "pruned": false }));
        };
        let stale = driver.documents().search(criteria.size(0)).await?;
        return print_json(&json!({
            "threshold": config.threshold,
            "dry_run": true,
            "stale": stale.total(),
        }));
    }

    let pruned = driver.documents().prune(&entity, true).await?;
    print_json(&json!({ "threshold": config.threshold, "pruned": pruned }))
}
