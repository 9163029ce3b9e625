//! # esaudit-core
//!
//! Records and configuration shared by the esaudit crates.
//!
//! - [`record`]: the [`AuditRecord`] change event and its document rendering
//! - [`config`]: typed YAML configuration, resolved once at startup

pub mod config;
pub mod record;

pub use config::{ConfigError, DateFormat, ElasticConfig, EsAuditConfig};
pub use record::{AuditEventKind, AuditRecord, AuditRecordBuilder, Identifier};
