//! Audit index provisioning.

use esaudit_core::ElasticConfig;
use std::sync::Arc;

use crate::error::AuditError;
use crate::mapping::MappingModel;
use crate::transport::{Transport, TransportRequest};

const ALREADY_EXISTS: &str = "resource_already_exists_exception";

/// Creates, deletes and checks the audit index.
///
/// Create and delete are idempotent: an existing index on create and a
/// missing index on delete both count as success.
pub struct AuditIndexService {
    transport: Arc<dyn Transport>,
    index: String,
    mapping: MappingModel,
}

impl AuditIndexService {
    /// Create an index service. Fails fast on invalid configuration.
    pub fn new(transport: Arc<dyn Transport>, config: &ElasticConfig) -> Result<Self, AuditError> {
        config.validate()?;
        Ok(Self {
            transport,
            index: config.index.clone(),
            mapping: MappingModel::from_config(config)?,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn mapping(&self) -> &MappingModel {
        &self.mapping
    }

    /// Make sure the audit index exists with the audit mapping.
    pub async fn create_index(&self) -> Result<bool, AuditError> {
        if self.index_exists().await? {
            tracing::debug!(index = %self.index, "Audit index already exists");
            return Ok(true);
        }

        let request = TransportRequest::put(format!("/{}", self.index))
            .with_body(self.mapping.index_body());
        let response = self.transport.execute(request.clone()).await?;

        if response.is_success() {
            tracing::info!(index = %self.index, "Created audit index");
            return Ok(true);
        }
        if response.error_type() == Some(ALREADY_EXISTS) {
            tracing::debug!(index = %self.index, "Audit index created concurrently");
            return Ok(true);
        }
        Err(AuditError::from_response(&request, &response))
    }

    /// Delete the audit index and every document in it.
    pub async fn delete_index(&self) -> Result<bool, AuditError> {
        let request = TransportRequest::delete(format!("/{}", self.index));
        let response = self.transport.execute(request.clone()).await?;

        if response.is_success() {
            tracing::info!(index = %self.index, "Deleted audit index");
            return Ok(true);
        }
        if response.is_not_found() {
            tracing::debug!(index = %self.index, "Audit index did not exist");
            return Ok(true);
        }
        Err(AuditError::from_response(&request, &response))
    }

    pub async fn index_exists(&self) -> Result<bool, AuditError> {
        let request = TransportRequest::head(format!("/{}", self.index));
        let response = self.transport.execute(request.clone()).await?;

        match response.status {
            200..=299 => Ok(true),
            404 => Ok(false),
            _ => Err(AuditError::from_response(&request, &response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;
    use crate::transport::Method;
    use serde_json::{Value, json};

    fn service(transport: &Arc<InMemoryTransport>) -> AuditIndexService {
        AuditIndexService::new(transport.clone(), &ElasticConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_create_index_sends_mapping() {
        let transport = Arc::new(InMemoryTransport::new());
        let indices = service(&transport);

        assert!(indices.create_index().await.unwrap());

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::Head);
        assert_eq!(requests[1].method, Method::Put);
        assert_eq!(requests[1].path, "/audits");
        let body = requests[1].body.as_ref().unwrap();
        assert_eq!(
            body["mappings"]["properties"]["created_at"],
            json!({"type": "date", "format": "yyyy-MM-dd HH:mm:ss"})
        );
    }

    #[tokio::test]
    async fn test_create_index_skips_existing() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(200, Value::Null);
        let indices = service(&transport);

        assert!(indices.create_index().await.unwrap());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_create_index_accepts_concurrent_creation() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(404, Value::Null);
        transport.push_response(
            400,
            json!({"error": {"type": "resource_already_exists_exception", "reason": "exists"}}),
        );
        let indices = service(&transport);

        assert!(indices.create_index().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_index_propagates_failure() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(404, Value::Null);
        transport.push_response(
            400,
            json!({"error": {"type": "mapper_parsing_exception", "reason": "bad mapping"}}),
        );
        let indices = service(&transport);

        let err = indices.create_index().await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("mapper_parsing_exception"));
    }

    #[tokio::test]
    async fn test_index_exists_rejects_unexpected_status() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(401, Value::Null);
        let indices = service(&transport);

        assert!(matches!(
            indices.index_exists().await,
            Err(AuditError::TransportFailure { status: 401, .. })
        ));
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let transport = Arc::new(InMemoryTransport::new());
        let config = ElasticConfig {
            date_format: "nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            AuditIndexService::new(transport, &config),
            Err(AuditError::Configuration(_))
        ));
    }
}
