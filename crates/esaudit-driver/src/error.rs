//! Error types for the driver crate.

use esaudit_core::ConfigError;
use thiserror::Error;

use crate::transport::{Method, TransportRequest, TransportResponse};

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The search engine answered with a status the operation does not accept.
    #[error("search engine returned HTTP {status} for {method} {path}: {reason}")]
    TransportFailure {
        method: Method,
        path: String,
        status: u16,
        reason: String,
    },

    /// No answer could be obtained from the search engine.
    #[error("failed to reach search engine: {0}")]
    Connection(String),

    /// An audit write was not acknowledged.
    #[error("audit record {id} was not acknowledged by the search engine")]
    WriteRejected { id: String },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuditError {
    /// Build a `TransportFailure` from a rejected request.
    pub fn from_response(request: &TransportRequest, response: &TransportResponse) -> Self {
        Self::TransportFailure {
            method: request.method,
            path: request.path.clone(),
            status: response.status,
            reason: response.error_reason(),
        }
    }

    /// HTTP status carried by a `TransportFailure`.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransportFailure { status, .. } => Some(*status),
            _ => None,
        }
    }
}
