//! HTTP transport seam between the client and the network.
//!
//! [`LlmClient`](crate::client::LlmClient) never talks to `reqwest` directly;
//! it goes through the [`Transport`] trait so tests can substitute a scripted
//! backend. [`ReqwestTransport`] is the production implementation.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Streamed response body, one network read per item.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Broad class of a network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request or a body read exceeded the configured timeout.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The peer reset or closed the connection mid-request.
    Reset,
    /// Reading the response body failed for another reason.
    Body,
    Other,
}

impl TransportErrorKind {
    /// Timeouts and dropped connections are worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TransportErrorKind::Timeout | TransportErrorKind::Connect | TransportErrorKind::Reset
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timed out"),
            TransportErrorKind::Connect => write!(f, "connection failed"),
            TransportErrorKind::Reset => write!(f, "connection reset"),
            TransportErrorKind::Body => write!(f, "body read failed"),
            TransportErrorKind::Other => write!(f, "request failed"),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify a `reqwest` failure.
    fn from_reqwest(err: &reqwest::Error) -> Self {
        let message = err.to_string();
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if looks_like_reset(&message) {
            TransportErrorKind::Reset
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self { kind, message }
    }
}

/// Whether an error message describes a dropped connection.
fn looks_like_reset(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "connection reset",
        "connection closed",
        "broken pipe",
        "unexpected eof",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// A JSON POST to a provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A response whose body is read incrementally.
pub struct StreamingReply {
    pub status: u16,
    pub body: ByteStream,
}

impl StreamingReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the remaining body into a string (used for error bodies).
    pub async fn text(mut self) -> String {
        let mut bytes = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            bytes.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Sends provider requests. Implementations must be cheap to share.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST and buffer the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError>;

    /// POST and hand back the body as a lazy byte stream.
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingReply, TransportError>;
}

/// [`Transport`] backed by a `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport whose connect, read, and whole-request timeouts are
    /// all `timeout`. Streaming requests only use the per-read timeout so a
    /// long generation is not cut off mid-stream.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rolecall/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;
        Ok(Self { client, timeout })
    }

    fn post(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let resp = self
            .post(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        Ok(HttpReply { status, body })
    }

    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingReply, TransportError> {
        let resp = self
            .post(&request)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let status = resp.status().as_u16();
        let body = resp.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::from_reqwest(&e))
        });
        Ok(StreamingReply {
            status,
            body: Box::pin(body),
        })
    }
}
