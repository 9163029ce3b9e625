//! The request/response seam towards the search engine.
//!
//! Connection setup, TLS and authentication live behind [`Transport`]; the
//! driver only builds requests and interprets status codes.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::AuditError;

/// HTTP method of a search engine request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request to the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute path, e.g. `/audits/_search`.
    pub path: String,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::Head, path)
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query string parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Look up a query string parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The search engine's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when empty.
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// The engine's error type, e.g. `resource_already_exists_exception`.
    pub fn error_type(&self) -> Option<&str> {
        self.body
            .get("error")
            .and_then(|e| e.get("type"))
            .and_then(Value::as_str)
    }

    /// Human readable failure reason.
    pub fn error_reason(&self) -> String {
        let error = self.body.get("error");
        let reason = error
            .and_then(|e| e.get("reason"))
            .and_then(Value::as_str);

        match (self.error_type(), reason) {
            (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
            (Some(kind), None) => kind.to_string(),
            _ => match (error, &self.body) {
                (Some(Value::String(message)), _) => message.clone(),
                (_, Value::Null) => "no response body".to_string(),
                (_, Value::String(body)) => body.clone(),
                (_, body) => body.to_string(),
            },
        }
    }
}

/// Sends requests to the search engine.
///
/// Implementations own connection handling, timeouts and retries. A
/// returned `Ok` carries whatever status the engine answered with.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AuditError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AuditError> {
        (**self).execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let request = TransportRequest::post("/audits/_delete_by_query")
            .with_query("refresh", "true")
            .with_body(json!({"query": {"match_all": {}}}));

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.query_param("refresh"), Some("true"));
        assert_eq!(request.query_param("conflicts"), None);
        assert!(request.body.is_some());
        assert_eq!(format!("{}", Method::Delete), "DELETE");
    }

    #[test]
    fn test_response_status_classes() {
        assert!(TransportResponse::new(201, Value::Null).is_success());
        assert!(!TransportResponse::new(404, Value::Null).is_success());
        assert!(TransportResponse::new(404, Value::Null).is_not_found());
    }

    #[test]
    fn test_error_reason() {
        let response = TransportResponse::new(
            400,
            json!({
                "error": {
                    "type": "resource_already_exists_exception",
                    "reason": "index [audits/abc] already exists"
                },
                "status": 400
            }),
        );
        assert_eq!(response.error_type(), Some("resource_already_exists_exception"));
        assert_eq!(
            response.error_reason(),
            "resource_already_exists_exception: index [audits/abc] already exists"
        );

        assert_eq!(
            TransportResponse::new(503, Value::Null).error_reason(),
            "no response body"
        );
        assert_eq!(
            TransportResponse::new(500, json!("boom")).error_reason(),
            "boom"
        );
    }
}
