//! HTTP transport to an Elasticsearch cluster.
//!
//! [`ElasticsearchClient`] sends driver requests to the first configured host
//! with reqwest over rustls. Basic auth and an additional CA bundle are
//! resolved once, when the client is built.

use async_trait::async_trait;
use esaudit_core::{ConfigError, ElasticConfig};
use esaudit_driver::{AuditError, Method, Transport, TransportRequest, TransportResponse};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: String,
}

/// [`Transport`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    client: reqwest::Client,
    base_url: String,
    auth: Option<BasicAuth>,
    ca_bundle: Option<PathBuf>,
}

impl ElasticsearchClient {
    /// Build a client from the driver configuration.
    ///
    /// Fails when the configuration is invalid, the basic auth password
    /// cannot be resolved, or the CA bundle cannot be loaded.
    pub fn new(config: &ElasticConfig) -> Result<Self, AuditError> {
        config.validate()?;

        let base_url = config
            .primary_host()
            .map(str::to_string)
            .ok_or_else(|| ConfigError::Config("drivers.elastic.hosts is empty".to_string()))?;

        let auth = if config.use_basic_auth {
            let password = config.resolve_password().ok_or_else(|| {
                ConfigError::Config(format!(
                    "basic auth password not set (password_env: {})",
                    config.password_env.as_deref().unwrap_or("-")
                ))
            })?;
            Some(BasicAuth {
                username: config.username.clone().unwrap_or_default(),
                password,
            })
        } else {
            None
        };

        let ca_bundle = config.cert_path.clone().filter(|_| config.use_ca_cert);

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_seconds));
        if let Some(path) = &ca_bundle {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }
        let client = builder
            .build()
            .map_err(|e| AuditError::Connection(format!("failed to build HTTP client: {}", e)))?;

        tracing::debug!(
            host = %base_url,
            basic_auth = auth.is_some(),
            ca_bundle = ?ca_bundle,
            "Search engine client ready"
        );

        Ok(Self {
            client,
            base_url,
            auth,
            ca_bundle,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The CA bundle trusted in addition to the built-in roots.
    pub fn ca_bundle_path(&self) -> Option<&Path> {
        self.ca_bundle.as_deref()
    }

    pub fn uses_basic_auth(&self) -> bool {
        self.auth.is_some()
    }
}

#[async_trait]
impl Transport for ElasticsearchClient {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, AuditError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(http_method(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(auth) = &self.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| connection_error(&self.base_url, &e))?;

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status,
            "Search engine request"
        );

        let body = match request.method {
            Method::Head => Value::Null,
            _ => decode_body(&bytes),
        };
        Ok(TransportResponse::new(status, body))
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn load_certificate(path: &Path) -> Result<reqwest::Certificate, ConfigError> {
    let pem = std::fs::read(path).map_err(|e| {
        ConfigError::Config(format!("cannot read CA bundle {}: {}", path.display(), e))
    })?;
    reqwest::Certificate::from_pem(&pem).map_err(|e| {
        ConfigError::Config(format!("invalid CA bundle {}: {}", path.display(), e))
    })
}

// Empty bodies become null; anything that is not JSON is kept as text
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn connection_error(base_url: &str, err: &reqwest::Error) -> AuditError {
    let message = if err.is_connect() {
        format!("cannot connect to search engine at {}", base_url)
    } else if err.is_timeout() {
        format!("request to search engine at {} timed out", base_url)
    } else {
        format!("request to search engine failed: {}", err)
    };
    AuditError::Connection(message)
}
