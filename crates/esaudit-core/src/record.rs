//! Audit record types.
//!
//! An [`AuditRecord`] describes one change to an auditable entity: what kind
//! of change it was, which entity it touched, the attribute values before and
//! after, and where the change came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::config::DateFormat;

/// Nested date attributes that share the index date format.
pub const NESTED_DATE_FIELDS: [&str; 3] = ["created_at", "updated_at", "deleted_at"];

/// Identifier of a record or of an auditable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Int(i64),
    Text(String),
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{}", id),
            Self::Text(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<i32> for Identifier {
    fn from(id: i32) -> Self {
        Self::Int(id.into())
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Self {
        Self::Int(id.into())
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl From<Uuid> for Identifier {
    fn from(id: Uuid) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        match id {
            Identifier::Int(id) => Value::from(id),
            Identifier::Text(id) => Value::from(id),
        }
    }
}

impl From<&Identifier> for Value {
    fn from(id: &Identifier) -> Self {
        id.clone().into()
    }
}

/// Kind of change an audit record describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuditEventKind {
    Created,
    Updated,
    Deleted,
    Restored,
    /// Application-defined event name.
    Custom(String),
}

impl AuditEventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AuditEventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            "restored" => Self::Restored,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for AuditEventKind {
    fn from(name: &str) -> Self {
        name.to_string().into()
    }
}

impl From<AuditEventKind> for String {
    fn from(kind: AuditEventKind) -> Self {
        match kind {
            AuditEventKind::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// One change event on an auditable entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// Document identifier, unique within the audit index.
    pub id: Identifier,

    /// What happened.
    pub event: AuditEventKind,

    /// Type name of the changed entity.
    pub auditable_type: String,

    /// Identifier of the changed entity.
    pub auditable_id: Identifier,

    /// Attribute values before the change.
    pub old_values: Map<String, Value>,

    /// Attribute values after the change.
    pub new_values: Map<String, Value>,

    /// Client IP address.
    pub ip_address: Option<String>,

    /// Request URL.
    pub url: Option<String>,

    /// Client user agent.
    pub user_agent: Option<String>,

    /// Type of the user responsible for the change.
    pub user_type: Option<String>,

    /// Identifier of the user responsible for the change.
    pub user_id: Option<Identifier>,

    /// Free-form tags.
    pub tags: Vec<String>,

    /// When the change happened.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a record with a fresh random id, stamped now.
    pub fn new(
        event: impl Into<AuditEventKind>,
        auditable_type: impl Into<String>,
        auditable_id: impl Into<Identifier>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().into(),
            event: event.into(),
            auditable_type: auditable_type.into(),
            auditable_id: auditable_id.into(),
            old_values: Map::new(),
            new_values: Map::new(),
            ip_address: None,
            url: None,
            user_agent: None,
            user_type: None,
            user_id: None,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a builder for an audit record.
    pub fn builder(
        event: impl Into<AuditEventKind>,
        auditable_type: impl Into<String>,
        auditable_id: impl Into<Identifier>,
    ) -> AuditRecordBuilder {
        AuditRecordBuilder {
            record: Self::new(event, auditable_type, auditable_id),
        }
    }

    /// Render the record as an index document.
    ///
    /// `created_at` and the nested `created_at`/`updated_at`/`deleted_at`
    /// values are written with `format`. Nested values that are RFC 3339
    /// timestamps are converted; anything else is stored untouched.
    pub fn to_document(&self, format: &DateFormat) -> Value {
        json!({
            "id": self.id,
            "event": self.event.as_str(),
            "auditable_type": self.auditable_type,
            "auditable_id": self.auditable_id,
            "old_values": normalize_dates(&self.old_values, format),
            "new_values": normalize_dates(&self.new_values, format),
            "ip_address": self.ip_address,
            "url": self.url,
            "user_agent": self.user_agent,
            "user_type": self.user_type,
            "user_id": self.user_id,
            "tags": self.tags,
            "created_at": format.format(&self.created_at),
        })
    }
}

fn normalize_dates(values: &Map<String, Value>, format: &DateFormat) -> Map<String, Value> {
    let mut out = values.clone();
    for field in NESTED_DATE_FIELDS {
        if let Some(Value::String(raw)) = values.get(field)
            && format.parse_datetime(raw).is_none()
            && let Ok(parsed) = DateTime::parse_from_rfc3339(raw)
        {
            let rendered = format.format(&parsed.with_timezone(&Utc));
            out.insert(field.to_string(), Value::String(rendered));
        }
    }
    out
}

/// Builder for audit records.
#[derive(Debug)]
pub struct AuditRecordBuilder {
    record: AuditRecord,
}

impl AuditRecordBuilder {
    /// Set the document identifier.
    pub fn id(mut self, id: impl Into<Identifier>) -> Self {
        self.record.id = id.into();
        self
    }

    /// Set the values before the change.
    pub fn old_values(mut self, values: Map<String, Value>) -> Self {
        self.record.old_values = values;
        self
    }

    /// Set the values after the change.
    pub fn new_values(mut self, values: Map<String, Value>) -> Self {
        self.record.new_values = values;
        self
    }

    /// Set the client IP.
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.record.ip_address = Some(ip.into());
        self
    }

    /// Set the request URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.record.url = Some(url.into());
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.record.user_agent = Some(user_agent.into());
        self
    }

    /// Attribute the change to a user.
    pub fn user(mut self, user_type: impl Into<String>, user_id: impl Into<Identifier>) -> Self {
        self.record.user_type = Some(user_type.into());
        self.record.user_id = Some(user_id.into());
        self
    }

    /// Set the tags.
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.record.tags = tags;
        self
    }

    /// Override the event time.
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.record.created_at = at;
        self
    }

    /// Build the audit record.
    pub fn build(self) -> AuditRecord {
        self.record
    }
}
