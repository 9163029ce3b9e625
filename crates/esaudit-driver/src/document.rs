//! Audit document writes, searches, deletes and retention.

use chrono::{Duration, Utc};
use esaudit_core::{AuditRecord, ConfigError, DateFormat, EsAuditConfig, Identifier};
use std::sync::Arc;

use crate::driver::Auditable;
use crate::error::AuditError;
use crate::query::{QueryBuilder, QueryCriteria, SearchResult};
use crate::transport::{Transport, TransportRequest};

/// Reads and writes audit documents in the audit index.
///
/// Every operation issues a single request and awaits its answer; nothing is
/// queued or retried.
pub struct AuditDocumentService {
    transport: Arc<dyn Transport>,
    index: String,
    date_format: DateFormat,
    threshold_days: u32,
}

impl AuditDocumentService {
    /// Create a document service. Fails fast on invalid configuration.
    pub fn new(transport: Arc<dyn Transport>, config: &EsAuditConfig) -> Result<Self, AuditError> {
        config.validate()?;
        let elastic = &config.drivers.elastic;

        Ok(Self {
            transport,
            index: elastic.index.clone(),
            date_format: elastic.date_format()?,
            threshold_days: config.threshold,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn date_format(&self) -> &DateFormat {
        &self.date_format
    }

    /// Retention threshold in days, `0` when pruning is disabled.
    pub fn threshold_days(&self) -> u32 {
        self.threshold_days
    }

    /// Start a new query against the audit index.
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }

    /// Run a query. A missing index yields an empty result.
    pub async fn search(&self, criteria: QueryCriteria) -> Result<SearchResult, AuditError> {
        let request = TransportRequest::post(format!("/{}/_search", self.index))
            .with_body(criteria.render(&self.date_format));
        let response = self.transport.execute(request.clone()).await?;

        if response.is_success() {
            let result = SearchResult::from_response(&response.body);
            tracing::debug!(index = %self.index, total = result.total(), "Audit search");
            return Ok(result);
        }
        if response.is_not_found() {
            tracing::debug!(index = %self.index, "Audit index missing, empty search result");
            return Ok(SearchResult::empty());
        }
        Err(AuditError::from_response(&request, &response))
    }

    /// Write one audit document keyed by the record id, replacing any
    /// document with the same id.
    ///
    /// With `should_return_result` the answer says whether the engine
    /// acknowledged the write. Without it the write still happens but the
    /// answer is always `false` and failures are only logged.
    pub async fn index_document(
        &self,
        record: &AuditRecord,
        should_return_result: bool,
    ) -> Result<bool, AuditError> {
        // Text ids can hold `/`, `?` or `#`, the id must stay one path segment
        let id = record.id.to_string();
        let path = format!("/{}/_doc/{}", self.index, urlencoding::encode(&id));
        let request = TransportRequest::put(path)
            .with_body(record.to_document(&self.date_format));

        if !should_return_result {
            match self.transport.execute(request).await {
                Ok(response) if response.is_success() => {
                    tracing::debug!(index = %self.index, id = %record.id, "Audit document indexed");
                }
                Ok(response) => {
                    tracing::warn!(
                        index = %self.index,
                        id = %record.id,
                        status = response.status,
                        reason = %response.error_reason(),
                        "Audit document write not acknowledged"
                    );
                }
                Err(e) => {
                    tracing::warn!(index = %self.index, id = %record.id, error = %e, "Audit document write failed");
                }
            }
            return Ok(false);
        }

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            tracing::warn!(
                index = %self.index,
                id = %record.id,
                status = response.status,
                reason = %response.error_reason(),
                "Audit document write not acknowledged"
            );
        }
        Ok(response.is_success())
    }

    /// Find the audit documents of one auditable entity.
    pub async fn search_audit_document(
        &self,
        entity: &dyn Auditable,
    ) -> Result<SearchResult, AuditError> {
        self.query()
            .set_term("auditable_type", entity.auditable_type())
            .set_term("auditable_id", entity.auditable_id())
            .search()
            .await
    }

    /// Delete every audit document of the given auditable id.
    ///
    /// With `refresh` the deletion is visible to the next search. The answer
    /// reports whether the delete request succeeded, not whether anything
    /// was deleted.
    pub async fn delete_audit_document(
        &self,
        auditable_id: impl Into<Identifier>,
        refresh: bool,
    ) -> Result<bool, AuditError> {
        let criteria = QueryCriteria::new().set_term("auditable_id", auditable_id.into());
        self.delete_by_query(&criteria, refresh).await
    }

    /// Apply the retention threshold to one auditable entity.
    ///
    /// Looks for the entity's documents older than `threshold` days and,
    /// with `should_delete`, removes them. Answers `true` only when stale
    /// documents were found and deleted; a disabled threshold is always
    /// `false`.
    pub async fn prune(&self, entity: &dyn Auditable, should_delete: bool) -> Result<bool, AuditError> {
        let Some(criteria) = self.stale_criteria(entity)? else {
            tracing::debug!(auditable_type = %entity.auditable_type(), "Retention disabled, skipping prune");
            return Ok(false);
        };

        let stale = self.search(criteria.clone()).await?;
        if !stale.as_bool() {
            return Ok(false);
        }

        if !should_delete {
            tracing::info!(
                auditable_type = %entity.auditable_type(),
                auditable_id = %entity.auditable_id(),
                stale = stale.total(),
                "Stale audit documents found, deletion not requested"
            );
            return Ok(false);
        }

        let deleted = self.delete_by_query(&criteria, false).await?;
        tracing::info!(
            auditable_type = %entity.auditable_type(),
            auditable_id = %entity.auditable_id(),
            stale = stale.total(),
            threshold_days = self.threshold_days,
            "Pruned audit documents"
        );
        Ok(deleted)
    }

    /// Criteria selecting the entity's documents older than the retention
    /// threshold, `None` when retention is disabled.
    pub fn stale_criteria(&self, entity: &dyn Auditable) -> Result<Option<QueryCriteria>, AuditError> {
        if self.threshold_days == 0 {
            return Ok(None);
        }

        let cutoff = Duration::try_days(i64::from(self.threshold_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| {
                ConfigError::Config(format!(
                    "threshold of {} days is out of range",
                    self.threshold_days
                ))
            })?;

        Ok(Some(
            QueryCriteria::new()
                .set_date_range(None, Some(cutoff))
                .set_term("auditable_type", entity.auditable_type())
                .set_term("auditable_id", entity.auditable_id()),
        ))
    }

    async fn delete_by_query(&self, criteria: &QueryCriteria, refresh: bool) -> Result<bool, AuditError> {
        let mut request = TransportRequest::post(format!("/{}/_delete_by_query", self.index))
            .with_query("conflicts", "proceed")
            .with_body(serde_json::json!({ "query": criteria.to_query(&self.date_format) }));
        if refresh {
            request = request.with_query("refresh", "true");
        }

        let response = self.transport.execute(request.clone()).await?;
        if response.is_success() {
            tracing::debug!(
                index = %self.index,
                deleted = response.body.get("deleted").and_then(serde_json::Value::as_u64),
                refresh,
                "Audit documents deleted"
            );
            return Ok(true);
        }
        if response.is_not_found() {
            tracing::debug!(index = %self.index, "Audit index missing, nothing to delete");
            return Ok(true);
        }
        Err(AuditError::from_response(&request, &response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTransport;
    use crate::transport::Method;
    use serde_json::{Value, json};

    fn service(transport: &Arc<InMemoryTransport>, threshold: u32) -> AuditDocumentService {
        let config = EsAuditConfig {
            threshold,
            ..Default::default()
        };
        AuditDocumentService::new(transport.clone(), &config).unwrap()
    }

    #[tokio::test]
    async fn test_index_document_request() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 0);
        let record = AuditRecord::builder("created", "User", 42).id(1).build();

        assert!(documents.index_document(&record, true).await.unwrap());

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, "/audits/_doc/1");
        assert_eq!(request.body.as_ref().unwrap()["auditable_id"], json!(42));
    }

    #[tokio::test]
    async fn test_text_id_is_one_path_segment() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 0);
        let record = AuditRecord::builder("created", "Order", 7).id("orders/2024-1?v#2").build();

        assert!(documents.index_document(&record, true).await.unwrap());
        assert_eq!(transport.requests()[0].path, "/audits/_doc/orders%2F2024-1%3Fv%232");
    }

    #[tokio::test]
    async fn test_fire_and_forget_swallows_failures() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(500, json!({"error": {"type": "exception", "reason": "disk full"}}));
        let documents = service(&transport, 0);
        let record = AuditRecord::new("created", "User", 42);

        assert!(!documents.index_document(&record, false).await.unwrap());
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_acknowledged_write_reports_rejection() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(400, json!({"error": {"type": "mapper_parsing_exception"}}));
        let documents = service(&transport, 0);
        let record = AuditRecord::new("created", "User", 42);

        assert!(!documents.index_document(&record, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_request_uses_refresh() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(200, json!({"deleted": 0}));
        transport.push_response(200, json!({"deleted": 0}));
        let documents = service(&transport, 0);

        assert!(documents.delete_audit_document(42, true).await.unwrap());
        assert!(documents.delete_audit_document(42, false).await.unwrap());

        let requests = transport.requests();
        assert_eq!(requests[0].path, "/audits/_delete_by_query");
        assert_eq!(requests[0].query_param("refresh"), Some("true"));
        assert_eq!(requests[1].query_param("refresh"), None);
        assert_eq!(
            requests[0].body.as_ref().unwrap()["query"],
            json!({"bool": {"must": [{"term": {"auditable_id": 42}}]}})
        );
    }

    #[tokio::test]
    async fn test_delete_on_missing_index_succeeds() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 0);

        assert!(documents.delete_audit_document("p-1", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_propagates_server_error() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.push_response(500, Value::Null);
        let documents = service(&transport, 0);

        assert!(matches!(
            documents.delete_audit_document(42, false).await,
            Err(AuditError::TransportFailure { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_search_on_missing_index_is_empty() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 0);

        let result = documents.query().set_term("auditable_id", 1).search().await.unwrap();
        assert!(!result.as_bool());
    }

    #[tokio::test]
    async fn test_prune_disabled_sends_nothing() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 0);
        let record = AuditRecord::new("created", "User", 42);

        assert!(!documents.prune(&record, true).await.unwrap());
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_out_of_range_threshold_fails_fast() {
        let transport = Arc::new(InMemoryTransport::new());
        let config = EsAuditConfig {
            threshold: u32::MAX,
            ..Default::default()
        };
        assert!(matches!(
            AuditDocumentService::new(transport, &config),
            Err(AuditError::Configuration(_))
        ));
    }

    #[test]
    fn test_stale_criteria() {
        let transport = Arc::new(InMemoryTransport::new());
        let record = AuditRecord::new("created", "User", 42);

        assert!(service(&transport, 0).stale_criteria(&record).unwrap().is_none());

        let documents = service(&transport, 5);
        let criteria = documents.stale_criteria(&record).unwrap().unwrap();
        let range = criteria.date_range().unwrap();
        assert!(range.from.is_none());
        assert!(range.to.is_some_and(|to| to < Utc::now() - Duration::days(4)));
        assert_eq!(criteria.terms()["auditable_id"], json!(42));
        assert_eq!(criteria.terms()["auditable_type"], json!("User"));
    }

    #[test]
    fn test_builder_exposes_criteria() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 0);

        let query = documents
            .query()
            .set_term("event", "updated")
            .set_term("auditable_id", 42)
            .set_term("event", Value::Null)
            .size(3);
        let expected = QueryCriteria::new().set_term("auditable_id", 42).size(3);
        assert_eq!(query.criteria(), &expected);
    }

    #[tokio::test]
    async fn test_prune_query_targets_entity_and_cutoff() {
        let transport = Arc::new(InMemoryTransport::new());
        let documents = service(&transport, 5);
        let record = AuditRecord::new("created", "User", 42);

        assert!(!documents.prune(&record, true).await.unwrap());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let must = &requests[0].body.as_ref().unwrap()["query"]["bool"]["must"];
        assert!(must[0]["range"]["created_at"]["lte"].is_string());
        assert!(must[0]["range"]["created_at"].get("gte").is_none());
        assert_eq!(must[1], json!({"term": {"auditable_id": 42}}));
        assert_eq!(must[2], json!({"term": {"auditable_type": "User"}}));
    }
}
