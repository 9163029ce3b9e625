//! Index mapping for audit documents.

use esaudit_core::{ConfigError, DateFormat, ElasticConfig};
use esaudit_core::record::NESTED_DATE_FIELDS;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Engine field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Keyword,
    Date,
}

/// Type descriptor of one mapped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldMapping {
    Field {
        #[serde(rename = "type")]
        field_type: FieldType,
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Object {
        properties: BTreeMap<String, FieldMapping>,
    },
}

impl FieldMapping {
    pub fn keyword() -> Self {
        Self::Field {
            field_type: FieldType::Keyword,
            format: None,
        }
    }

    pub fn date(format: &DateFormat) -> Self {
        Self::Field {
            field_type: FieldType::Date,
            format: Some(format.pattern().to_string()),
        }
    }
}

/// Field name to type descriptor.
pub type IndexMapping = BTreeMap<String, FieldMapping>;

/// Produces the mapping used when the audit index is provisioned.
///
/// Every date field shares the single configured date format. Documents
/// already stored keep whatever format they were written with.
#[derive(Debug, Clone, Default)]
pub struct MappingModel {
    date_format: DateFormat,
}

impl MappingModel {
    pub fn new(date_format: DateFormat) -> Self {
        Self { date_format }
    }

    pub fn from_config(config: &ElasticConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.date_format()?))
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.date_format
    }

    pub fn get_model(&self) -> IndexMapping {
        let mut model = IndexMapping::new();
        for field in ["event", "auditable_type", "auditable_id", "ip_address", "url", "user_agent"] {
            model.insert(field.to_string(), FieldMapping::keyword());
        }
        model.insert("created_at".to_string(), FieldMapping::date(&self.date_format));
        model.insert("new_values".to_string(), self.values_mapping());
        model.insert("old_values".to_string(), self.values_mapping());
        model
    }

    /// Create-index request body.
    pub fn index_body(&self) -> Value {
        json!({ "mappings": { "properties": self.get_model() } })
    }

    fn values_mapping(&self) -> FieldMapping {
        let properties = NESTED_DATE_FIELDS
            .iter()
            .map(|field| (field.to_string(), FieldMapping::date(&self.date_format)))
            .collect();
        FieldMapping::Object { properties }
    }
}
