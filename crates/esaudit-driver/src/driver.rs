//! The audit entry point.
//!
//! The change-tracking layer hands each tracked change to an
//! [`AuditDriver`]. [`AuditOrchestrator`] is the Elasticsearch driver: it
//! provisions the index, converts the entity into an [`AuditRecord`], writes
//! it and applies the retention threshold, all in the caller's task.

use async_trait::async_trait;
use esaudit_core::{AuditRecord, EsAuditConfig, Identifier};
use std::sync::Arc;

use crate::document::AuditDocumentService;
use crate::error::AuditError;
use crate::index::AuditIndexService;
use crate::transport::Transport;

/// An entity whose changes are recorded.
pub trait Auditable: Send + Sync {
    /// Type name stored as `auditable_type`.
    fn auditable_type(&self) -> &str;

    /// Identifier stored as `auditable_id`.
    fn auditable_id(&self) -> Identifier;

    /// Describe the current change as an audit record.
    fn to_record(&self) -> anyhow::Result<AuditRecord>;
}

impl Auditable for AuditRecord {
    fn auditable_type(&self) -> &str {
        &self.auditable_type
    }

    fn auditable_id(&self) -> Identifier {
        self.auditable_id.clone()
    }

    fn to_record(&self) -> anyhow::Result<AuditRecord> {
        Ok(self.clone())
    }
}

/// The user a change is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditUser {
    pub user_type: String,
    pub user_id: Identifier,
}

impl AuditUser {
    pub fn new(user_type: impl Into<String>, user_id: impl Into<Identifier>) -> Self {
        Self {
            user_type: user_type.into(),
            user_id: user_id.into(),
        }
    }
}

/// Resolves the user responsible for the change being audited.
pub trait UserResolver: Send + Sync {
    fn resolve(&self) -> Option<AuditUser>;
}

/// Resolver for changes made without a user, e.g. by jobs.
pub struct NoUserResolver;

impl UserResolver for NoUserResolver {
    fn resolve(&self) -> Option<AuditUser> {
        None
    }
}

/// Resolver that always answers with the same user.
pub struct StaticUserResolver(pub AuditUser);

impl UserResolver for StaticUserResolver {
    fn resolve(&self) -> Option<AuditUser> {
        Some(self.0.clone())
    }
}

/// Storage driver contract used by the change-tracking layer.
#[async_trait]
pub trait AuditDriver: Send + Sync {
    /// Record the current change of `entity`.
    async fn audit(&self, entity: &dyn Auditable) -> Result<AuditRecord, AuditError>;

    /// Remove the entity's records older than the retention threshold.
    async fn prune(&self, entity: &dyn Auditable) -> Result<bool, AuditError>;

    /// Whether records are delivered out of band.
    fn is_async(&self) -> bool;
}

/// Elasticsearch audit driver.
pub struct AuditOrchestrator {
    indices: AuditIndexService,
    documents: AuditDocumentService,
    user_resolver: Arc<dyn UserResolver>,
}

impl AuditOrchestrator {
    /// Build the driver. Configuration is validated here, once.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &EsAuditConfig,
        user_resolver: Arc<dyn UserResolver>,
    ) -> Result<Self, AuditError> {
        Ok(Self {
            indices: AuditIndexService::new(transport.clone(), &config.drivers.elastic)?,
            documents: AuditDocumentService::new(transport, config)?,
            user_resolver,
        })
    }

    pub fn indices(&self) -> &AuditIndexService {
        &self.indices
    }

    pub fn documents(&self) -> &AuditDocumentService {
        &self.documents
    }

    /// Store the current change of `entity` and prune its stale records.
    ///
    /// Fails when the index cannot be provisioned, the entity cannot be
    /// converted, or the write is not acknowledged.
    pub async fn audit(&self, entity: &dyn Auditable) -> Result<AuditRecord, AuditError> {
        self.indices.create_index().await?;

        let mut record = entity.to_record()?;
        if record.user_id.is_none()
            && let Some(user) = self.user_resolver.resolve()
        {
            record.user_type = Some(user.user_type);
            record.user_id = Some(user.user_id);
        }

        if !self.documents.index_document(&record, true).await? {
            return Err(AuditError::WriteRejected {
                id: record.id.to_string(),
            });
        }

        tracing::debug!(
            id = %record.id,
            event = %record.event,
            auditable_type = %record.auditable_type,
            auditable_id = %record.auditable_id,
            "Audit record stored"
        );

        self.documents.prune(&record, true).await?;
        Ok(record)
    }

    /// Always `false`: every call talks to the engine before returning.
    pub fn is_async(&self) -> bool {
        false
    }
}

#[async_trait]
impl AuditDriver for AuditOrchestrator {
    async fn audit(&self, entity: &dyn Auditable) -> Result<AuditRecord, AuditError> {
        AuditOrchestrator::audit(self, entity).await
    }

    async fn prune(&self, entity: &dyn Auditable) -> Result<bool, AuditError> {
        self.documents.prune(entity, true).await
    }

    fn is_async(&self) -> bool {
        AuditOrchestrator::is_async(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;
    use serde_json::{Value, json};

    struct Post {
        id: i64,
        title: String,
    }

    impl Auditable for Post {
        fn auditable_type(&self) -> &str {
            "App\\Models\\Post"
        }

        fn auditable_id(&self) -> Identifier {
            self.id.into()
        }

        fn to_record(&self) -> anyhow::Result<AuditRecord> {
            let mut new_values = serde_json::Map::new();
            new_values.insert("title".to_string(), json!(self.title));
            Ok(AuditRecord::builder("created", self.auditable_type(), self.id)
                .new_values(new_values)
                .build())
        }
    }

    struct Broken;

    impl Auditable for Broken {
        fn auditable_type(&self) -> &str {
            "Broken"
        }

        fn auditable_id(&self) -> Identifier {
            0.into()
        }

        fn to_record(&self) -> anyhow::Result<AuditRecord> {
            Err(anyhow::anyhow!("entity has no attributes"))
        }
    }

    fn orchestrator(transport: &Arc<InMemoryTransport>, resolver: Arc<dyn UserResolver>) -> AuditOrchestrator {
        AuditOrchestrator::new(transport.clone(), &EsAuditConfig::default(), resolver).unwrap()
    }

    #[tokio::test]
    async fn test_audit_stamps_resolved_user() {
        let transport = Arc::new(InMemoryTransport::new());
        let resolver = Arc::new(StaticUserResolver(AuditUser::new("App\\Models\\User", 9)));
        let driver = orchestrator(&transport, resolver);

        let post = Post { id: 3, title: "Hello".to_string() };
        let record = driver.audit(&post).await.unwrap();

        assert_eq!(record.user_type.as_deref(), Some("App\\Models\\User"));
        assert_eq!(record.user_id, Some(Identifier::Int(9)));
        assert!(transport.has_index("audits"));
        assert_eq!(transport.document_count("audits"), 1);
    }

    #[tokio::test]
    async fn test_audit_keeps_producer_user() {
        let transport = Arc::new(InMemoryTransport::new());
        let resolver = Arc::new(StaticUserResolver(AuditUser::new("Admin", 1)));
        let driver = orchestrator(&transport, resolver);

        let record = AuditRecord::builder("updated", "Post", 3).user("Editor", 5).build();
        let stored = driver.audit(&record).await.unwrap();
        assert_eq!(stored.user_type.as_deref(), Some("Editor"));
        assert_eq!(stored.user_id, Some(Identifier::Int(5)));
    }

    #[tokio::test]
    async fn test_audit_fails_when_write_rejected() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(200, Value::Null);
        transport.push_response(429, json!({"error": {"type": "es_rejected_execution_exception"}}));
        let driver = orchestrator(&transport, Arc::new(NoUserResolver));

        let post = Post { id: 3, title: "Hello".to_string() };
        assert!(matches!(
            driver.audit(&post).await,
            Err(AuditError::WriteRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_audit_propagates_producer_error() {
        let transport = Arc::new(InMemoryTransport::new());
        let driver = orchestrator(&transport, Arc::new(NoUserResolver));

        assert!(matches!(driver.audit(&Broken).await, Err(AuditError::Internal(_))));
        assert_eq!(transport.document_count("audits"), 0);
    }

    #[test]
    fn test_is_async() {
        let transport = Arc::new(InMemoryTransport::new());
        let driver = orchestrator(&transport, Arc::new(NoUserResolver));
        assert!(!driver.is_async());

        let driver: &dyn AuditDriver = &driver;
        assert!(!driver.is_async());
    }
}
