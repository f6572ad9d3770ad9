//! HTTP seam to the indexing backend
//!
//! `IndexTransport` only moves bytes: it sends a single document or a bulk
//! NDJSON body and hands back the raw status and body. Interpreting the
//! answer is the publisher's job, which keeps this trait easy to stub.

use crate::error::{ConfigError, PublishResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

/// Raw backend answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait IndexTransport: Send + Sync {
    /// Index one JSON document into `index` with the given document type
    async fn index_document(&self, index: &str, doc_type: &str, body: String) -> PublishResult<TransportResponse>;

    /// Send a bulk request; `body` is newline-delimited JSON
    async fn bulk(&self, body: String) -> PublishResult<TransportResponse>;
}

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// reqwest-backed transport. A fresh client (and connection) is created for
/// every call; fine at a publish period of seconds, not for high rates.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    timeout: Option<Duration>,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    pub fn new(host_address: &str) -> Result<Self, ConfigError> {
        if host_address.trim().is_empty() {
            return Err(ConfigError::Missing("elastic.host_address"));
        }
        let url = reqwest::Url::parse(host_address.trim())
            .map_err(|e| ConfigError::invalid("elastic.host_address", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "elastic.host_address",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            timeout: None,
            credentials: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password,
        });
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn connect(&self) -> PublishResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent("stats-publisher");
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, creds.password.as_ref()),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> PublishResult<TransportResponse> {
        let response = self.authorize(request).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl IndexTransport for HttpTransport {
    async fn index_document(&self, index: &str, doc_type: &str, body: String) -> PublishResult<TransportResponse> {
        let url = format!("{}/{}/{}", self.base_url, index, doc_type);
        debug!("POST {} ({} bytes)", url, body.len());

        let client = self.connect()?;
        let request = client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.send(request).await
    }

    async fn bulk(&self, body: String) -> PublishResult<TransportResponse> {
        let url = format!("{}/_bulk", self.base_url);
        debug!("POST {} ({} bytes)", url, body.len());

        let client = self.connect()?;
        let request = client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        self.send(request).await
    }
}
