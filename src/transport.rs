//! HTTP transport seam
//!
//! Clients only see [`Transport`]: a request goes in, a status plus a fully
//! buffered body comes out. [`UreqTransport`] is the blocking implementation
//! used by the binary.

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

/// Cap on buffered response bodies (XMLTV feeds can be large).
pub const MAX_BODY_BYTES: u64 = 50 * 1024 * 1024;

/// Default timeout applied to connect and whole-request phases.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP method used by the clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Value of the first header with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// e.g. "HTTP/1.1 200 OK"
    pub status_line: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_line: format!("HTTP/1.1 {}", status),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text. Borrows when the body is valid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("response body exceeded {0} bytes")]
    BodyTooLarge(u64),
}

/// Opaque fetch capability consumed by the clients.
pub trait Transport: Send + Sync {
    /// Performs the request and buffers the whole body.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).fetch(request)
    }
}

/// Blocking transport over a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Create a transport whose connect and global timeouts are `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .timeout_connect(Some(timeout))
            .http_status_as_error(false)
            .max_idle_connections(4)
            .max_idle_connections_per_host(2)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn with_timeout_secs(secs: u64) -> Self {
        let secs = if secs == 0 { DEFAULT_TIMEOUT_SECS } else { secs };
        Self::new(Duration::from_secs(secs))
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::with_timeout_secs(DEFAULT_TIMEOUT_SECS)
    }
}

impl Transport for UreqTransport {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let result = match request.method {
            Method::Get => {
                let mut builder = self.agent.get(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Delete => {
                let mut builder = self.agent.delete(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Post => {
                let mut builder = self.agent.post(&request.url);
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send(request.body.as_deref().unwrap_or_default())
            }
        };

        let mut response = result.map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        let status_line = format!("{:?} {}", response.version(), status);

        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|e| match e {
                ureq::Error::BodyExceedsLimit(limit) => TransportError::BodyTooLarge(limit),
                other => TransportError::Request(other.to_string()),
            })?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_line,
            body,
        })
    }
}
