//! Injectable HTTP transport. The executor only ever talks to the
//! [`HttpClient`] trait; [`ReqwestClient`] is the production
//! implementation.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use webwire_core::WebDriverError;

/// HTTP verbs used by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single wire request: method, server-relative path and optional JSON
/// body. Headers are the transport's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: HttpMethod,
    pub path: String,
    pub data: Option<Value>,
}

impl WireRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, data: Option<Value>) -> Self {
        WireRequest {
            method,
            path: path.into(),
            data,
        }
    }
}

/// Raw response handed back to the executor for decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        WireResponse {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport abstraction consumed by the executor.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send one request and return the raw response. Transport-level
    /// failures (connection refused, timeout) surface as errors; HTTP
    /// error statuses are normal responses.
    async fn send(&self, request: WireRequest) -> Result<WireResponse, WebDriverError>;
}

#[async_trait]
impl HttpClient for Box<dyn HttpClient> {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, WebDriverError> {
        (**self).send(request).await
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the remote end, e.g. `http://localhost:4444/wd/hub`.
    pub url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4444/wd/hub".to_string(),
            timeout_ms: 180_000,
        }
    }
}

/// Production transport backed by `reqwest`.
pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestClient {
    pub fn new(config: ClientConfig) -> Result<Self, WebDriverError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            reqwest::header::HeaderValue::from_static("no-cache"),
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                WebDriverError::unknown(format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(ReqwestClient {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, WebDriverError> {
        let url = self.url_for(&request.path);
        tracing::debug!(method = %request.method, %url, "sending request");

        let builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => {
                let body = request.data.unwrap_or(Value::Object(Default::default()));
                self.client.post(&url).json(&body)
            }
            HttpMethod::Delete => self.client.delete(&url),
        };

        let response = builder.send().await.map_err(|e| {
            WebDriverError::unknown(format!("HTTP request failed: {e}"))
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            WebDriverError::unknown(format!("Failed to read HTTP response: {e}"))
        })?;
        tracing::trace!(status, bytes = body.len(), "received response");

        Ok(WireResponse { status, body })
    }
}
