//! # esaudit-driver
//!
//! Stores audit records in Elasticsearch and enforces their retention.
//!
//! This crate provides:
//! - Index provisioning with a typed, date-format aware mapping
//! - Document writes keyed by record id (upsert)
//! - Term and date-range queries over audit documents
//! - Deletion by auditable id and threshold-based pruning
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`MappingModel`] | Field mapping used when the index is created |
//! | [`QueryCriteria`] / [`QueryBuilder`] | Filter accumulation and rendering |
//! | [`AuditIndexService`] | Idempotent index create/delete/exists |
//! | [`AuditDocumentService`] | Document write/search/delete/prune |
//! | [`AuditOrchestrator`] | The `audit` entry point ([`AuditDriver`]) |
//! | [`Transport`] | Request/response seam to the engine |
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use esaudit_core::{AuditRecord, EsAuditConfig};
//! use esaudit_driver::{AuditOrchestrator, InMemoryTransport, NoUserResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EsAuditConfig::default();
//! let driver = AuditOrchestrator::new(
//!     Arc::new(InMemoryTransport::new()),
//!     &config,
//!     Arc::new(NoUserResolver),
//! )?;
//!
//! let record = AuditRecord::builder("updated", "App\\Models\\User", 42).build();
//! driver.audit(&record).await?;
//!
//! let found = driver
//!     .documents()
//!     .query()
//!     .set_term("auditable_id", 42)
//!     .search()
//!     .await?;
//! assert!(found.as_bool());
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod driver;
pub mod error;
pub mod index;
pub mod mapping;
pub mod memory;
pub mod query;
pub mod transport;

pub use document::AuditDocumentService;
pub use driver::{
    AuditDriver, AuditOrchestrator, AuditUser, Auditable, NoUserResolver, StaticUserResolver,
    UserResolver,
};
pub use error::AuditError;
pub use index::AuditIndexService;
pub use mapping::{FieldMapping, FieldType, IndexMapping, MappingModel};
pub use memory::InMemoryTransport;
pub use query::{DateRange, QueryBuilder, QueryCriteria, SearchResult};
pub use transport::{Method, Transport, TransportRequest, TransportResponse};
