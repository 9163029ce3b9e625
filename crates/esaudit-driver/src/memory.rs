//! In-memory search engine.
//!
//! Emulates the part of the Elasticsearch API the driver uses: index
//! create/exists/delete, document put/get, `_search` and `_delete_by_query`
//! with `match_all`, `bool.must`, `term` and `range` queries. Writes are
//! visible immediately.
//!
//! Scripted responses queued with [`InMemoryTransport::push_response`] are
//! answered first, in order, before falling back to the emulation. Every
//! request is recorded.
//!
//! Range filters compare the stored strings, which orders correctly for
//! zero-padded, most-significant-first date patterns such as the default.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::error::AuditError;
use crate::transport::{Method, Transport, TransportRequest, TransportResponse};

const DEFAULT_SEARCH_SIZE: usize = 10;

#[derive(Debug, Default)]
struct MemoryIndex {
    mappings: Value,
    documents: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct MemoryState {
    indices: BTreeMap<String, MemoryIndex>,
    scripted: VecDeque<TransportResponse>,
    requests: Vec<TransportRequest>,
}

/// Transport backed by an in-process document store.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    state: Mutex<MemoryState>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned response for the next request.
    pub fn push_response(&self, status: u16, body: Value) {
        if let Ok(mut state) = self.state.lock() {
            state.scripted.push_back(TransportResponse::new(status, body));
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state
            .lock()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().map(|state| state.requests.len()).unwrap_or(0)
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.state
            .lock()
            .map(|state| state.indices.contains_key(index))
            .unwrap_or(false)
    }

    pub fn document_count(&self, index: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.indices.get(index).map(|i| i.documents.len()))
            .unwrap_or(0)
    }

    /// Stored mappings of an index.
    pub fn mappings(&self, index: &str) -> Option<Value> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.indices.get(index).map(|i| i.mappings.clone()))
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AuditError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| AuditError::Connection(format!("in-memory engine unavailable: {}", e)))?;

        state.requests.push(request.clone());
        if let Some(response) = state.scripted.pop_front() {
            return Ok(response);
        }
        Ok(handle(&mut state, &request))
    }
}

fn handle(state: &mut MemoryState, request: &TransportRequest) -> TransportResponse {
    let segments: Vec<&str> = request
        .path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match (request.method, segments.as_slice()) {
        (Method::Head, [index]) => {
            let status = if state.indices.contains_key(*index) { 200 } else { 404 };
            TransportResponse::new(status, Value::Null)
        }
        (Method::Get, [index]) => match state.indices.get(*index) {
            Some(i) => ok(json!({ *index: { "mappings": i.mappings } })),
            None => index_not_found(index),
        },
        (Method::Put, [index]) => {
            if state.indices.contains_key(*index) {
                return error(
                    400,
                    "resource_already_exists_exception",
                    format!("index [{}] already exists", index),
                );
            }
            let mappings = request
                .body
                .as_ref()
                .and_then(|b| b.get("mappings"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            state.indices.insert(
                index.to_string(),
                MemoryIndex {
                    mappings,
                    documents: BTreeMap::new(),
                },
            );
            ok(json!({ "acknowledged": true, "shards_acknowledged": true, "index": index }))
        }
        (Method::Delete, [index]) => match state.indices.remove(*index) {
            Some(_) => ok(json!({ "acknowledged": true })),
            None => index_not_found(index),
        },
        (Method::Put | Method::Post, [index, "_doc", id]) => {
            let Some(source) = request.body.clone() else {
                return error(400, "parse_exception", "request body is required".to_string());
            };
            let id = decode_segment(id);
            // Writing into a missing index creates it, like the real engine
            let documents = &mut state.indices.entry(index.to_string()).or_default().documents;
            let created = documents.insert(id.clone(), source).is_none();
            let (status, result) = if created { (201, "created") } else { (200, "updated") };
            TransportResponse::new(
                status,
                json!({ "_index": index, "_id": id, "result": result }),
            )
        }
        (Method::Get, [index, "_doc", id]) => {
            let Some(i) = state.indices.get(*index) else {
                return index_not_found(index);
            };
            let id = decode_segment(id);
            match i.documents.get(&id) {
                Some(source) => ok(json!({
                    "_index": index, "_id": id, "found": true, "_source": source
                })),
                None => TransportResponse::new(
                    404,
                    json!({ "_index": index, "_id": id, "found": false }),
                ),
            }
        }
        (Method::Get | Method::Post, [index, "_search"]) => {
            let Some(i) = state.indices.get(*index) else {
                return index_not_found(index);
            };
            let body = request.body.clone().unwrap_or_else(|| json!({}));
            let query = body.get("query").cloned().unwrap_or_else(|| json!({ "match_all": {} }));
            let size = body
                .get("size")
                .and_then(Value::as_u64)
                .map(|s| s as usize)
                .unwrap_or(DEFAULT_SEARCH_SIZE);

            let matched: Vec<(&String, &Value)> = i
                .documents
                .iter()
                .filter(|(_, doc)| matches(&query, doc))
                .collect();
            let hits: Vec<Value> = matched
                .iter()
                .take(size)
                .map(|(id, source)| {
                    json!({ "_index": index, "_id": id, "_score": 1.0, "_source": source })
                })
                .collect();
            let max_score = if hits.is_empty() { Value::Null } else { json!(1.0) };

            ok(json!({
                "took": 0,
                "timed_out": false,
                "hits": {
                    "total": { "value": matched.len(), "relation": "eq" },
                    "max_score": max_score,
                    "hits": hits
                }
            }))
        }
        (Method::Post, [index, "_delete_by_query"]) => {
            let Some(i) = state.indices.get_mut(*index) else {
                return index_not_found(index);
            };
            let query = request
                .body
                .as_ref()
                .and_then(|b| b.get("query"))
                .cloned()
                .unwrap_or(Value::Null);
            let before = i.documents.len();
            i.documents.retain(|_, doc| !matches(&query, doc));
            let deleted = before - i.documents.len();
            ok(json!({
                "took": 0,
                "timed_out": false,
                "total": deleted,
                "deleted": deleted,
                "version_conflicts": 0,
                "failures": []
            }))
        }
        _ => error(
            400,
            "illegal_argument_exception",
            format!("unsupported request {} {}", request.method, request.path),
        ),
    }
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

fn ok(body: Value) -> TransportResponse {
    TransportResponse::new(200, body)
}

fn error(status: u16, kind: &str, reason: String) -> TransportResponse {
    TransportResponse::new(
        status,
        json!({ "error": { "type": kind, "reason": reason }, "status": status }),
    )
}

fn index_not_found(index: &str) -> TransportResponse {
    error(404, "index_not_found_exception", format!("no such index [{}]", index))
}

fn matches(query: &Value, doc: &Value) -> bool {
    let Some(clause) = query.as_object() else {
        return false;
    };

    clause.iter().all(|(kind, params)| match kind.as_str() {
        "match_all" => true,
        "bool" => params
            .get("must")
            .and_then(Value::as_array)
            .is_none_or(|must| must.iter().all(|q| matches(q, doc))),
        "term" => params.as_object().is_some_and(|fields| {
            fields.iter().all(|(field, expected)| {
                let expected = expected.get("value").unwrap_or(expected);
                lookup(doc, field).is_some_and(|actual| same_term(actual, expected))
            })
        }),
        "range" => params.as_object().is_some_and(|fields| {
            fields
                .iter()
                .all(|(field, bounds)| lookup(doc, field).is_some_and(|actual| in_range(actual, bounds)))
        }),
        _ => false,
    })
}

fn lookup<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(doc, |value, key| value.get(key))
        .filter(|value| !value.is_null())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Keyword fields coerce numbers, so 42 and "42" are the same term
fn same_term(actual: &Value, expected: &Value) -> bool {
    if let Value::Array(items) = actual {
        return items.iter().any(|item| same_term(item, expected));
    }
    actual == expected
        || matches!((scalar_text(actual), scalar_text(expected)), (Some(a), Some(b)) if a == b)
}

fn in_range(actual: &Value, bounds: &Value) -> bool {
    let check = |op: &str, accept: fn(std::cmp::Ordering) -> bool| {
        bounds
            .get(op)
            .is_none_or(|bound| compare(actual, bound).is_some_and(accept))
    };
    check("gte", |o| o.is_ge())
        && check("gt", |o| o.is_gt())
        && check("lte", |o| o.is_le())
        && check("lt", |o| o.is_lt())
}

fn compare(actual: &Value, bound: &Value) -> Option<std::cmp::Ordering> {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn send(transport: &InMemoryTransport, request: TransportRequest) -> TransportResponse {
        transport.execute(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let transport = InMemoryTransport::new();

        assert_eq!(send(&transport, TransportRequest::head("/audits")).await.status, 404);
        let created = send(
            &transport,
            TransportRequest::put("/audits").with_body(json!({"mappings": {"properties": {}}})),
        )
        .await;
        assert!(created.is_success());
        assert!(transport.has_index("audits"));
        assert_eq!(transport.mappings("audits"), Some(json!({"properties": {}})));

        let again = send(&transport, TransportRequest::put("/audits")).await;
        assert_eq!(again.status, 400);
        assert_eq!(again.error_type(), Some("resource_already_exists_exception"));

        assert!(send(&transport, TransportRequest::delete("/audits")).await.is_success());
        assert_eq!(send(&transport, TransportRequest::delete("/audits")).await.status, 404);
        assert_eq!(transport.request_count(), 5);
    }

    #[tokio::test]
    async fn test_search_and_delete_by_query() {
        let transport = InMemoryTransport::new();
        for (id, auditable_id, at) in [
            ("1", 42, "2024-01-01 00:00:00"),
            ("2", 42, "2024-03-01 00:00:00"),
            ("3", 7, "2024-01-01 00:00:00"),
        ] {
            let doc = json!({"auditable_id": auditable_id, "created_at": at});
            let put = TransportRequest::put(format!("/audits/_doc/{}", id)).with_body(doc);
            assert_eq!(send(&transport, put).await.status, 201);
        }

        let search = TransportRequest::post("/audits/_search").with_body(json!({
            "query": {"bool": {"must": [
                {"term": {"auditable_id": "42"}},
                {"range": {"created_at": {"lte": "2024-02-01 00:00:00"}}}
            ]}}
        }));
        let response = send(&transport, search).await;
        assert_eq!(response.body["hits"]["total"]["value"], json!(1));
        assert_eq!(response.body["hits"]["hits"][0]["_id"], json!("1"));

        let delete = TransportRequest::post("/audits/_delete_by_query")
            .with_body(json!({"query": {"term": {"auditable_id": 42}}}));
        let response = send(&transport, delete).await;
        assert_eq!(response.body["deleted"], json!(2));
        assert_eq!(transport.document_count("audits"), 1);
    }

    #[tokio::test]
    async fn test_document_ids_are_decoded() {
        let transport = InMemoryTransport::new();
        let put = TransportRequest::put("/audits/_doc/orders%2F2024-1").with_body(json!({"n": 1}));
        assert_eq!(send(&transport, put).await.status, 201);

        let get = send(&transport, TransportRequest::get("/audits/_doc/orders%2F2024-1")).await;
        assert_eq!(get.body["_id"], json!("orders/2024-1"));
        assert_eq!(get.body["_source"], json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_scripted_responses_come_first() {
        let transport = InMemoryTransport::new();
        transport.push_response(503, json!({"error": "unavailable"}));

        let first = send(&transport, TransportRequest::head("/audits")).await;
        assert_eq!(first.status, 503);
        let second = send(&transport, TransportRequest::head("/audits")).await;
        assert_eq!(second.status, 404);
    }

    #[test]
    fn test_query_matching() {
        let doc = json!({"a": {"b": 1}});
        assert!(matches(&json!({"match_all": {}}), &doc));
        assert!(matches(&json!({"term": {"a.b": 1}}), &doc));
        assert!(!matches(&json!({"term": {"a.c": 1}}), &doc));
        assert!(!matches(&json!({"unknown": {}}), &doc));
    }
}
