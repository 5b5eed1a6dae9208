//! Error taxonomy for configuration, validation, and provider calls.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! split into three groups:
//!
//! - [`LlmError::Configuration`] and [`LlmError::Validation`] are raised
//!   before any network activity and are never retried.
//! - [`LlmError::Api`], [`LlmError::Transport`] and [`LlmError::Parse`] come
//!   from a single provider attempt. Only 429/503 responses and
//!   timeout/connection failures are retryable (see [`LlmError::is_retryable`]).
//! - [`LlmError::RetriesExhausted`] and [`LlmError::Request`] wrap a terminal
//!   failure. The original cause stays reachable through
//!   [`std::error::Error::source`].

use crate::api::transport::TransportError;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, LlmError>;

/// HTTP statuses that signal a transient provider condition.
const RETRYABLE_STATUSES: [u16; 2] = [429, 503];

#[derive(Error, Debug)]
pub enum LlmError {
    /// Invalid or missing provider, model, credential, or tuning parameter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed request (empty messages, out-of-range sampling values).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Non-success HTTP status returned by a provider.
    #[error("{provider} API HTTP {status}: {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },

    /// Network-level failure before a status code was available.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A provider response that could not be decoded.
    #[error("failed to parse {provider} response: {message}")]
    Parse { provider: String, message: String },

    /// Every attempt failed with a retryable error.
    #[error("giving up after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },

    /// Terminal failure of a call against a configured model.
    #[error("request to model '{model}' failed: {source}")]
    Request {
        model: String,
        #[source]
        source: Box<LlmError>,
    },
}

impl LlmError {
    pub(crate) fn parse(provider: impl Into<String>, message: impl Into<String>) -> Self {
        LlmError::Parse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub(crate) fn request(model: impl Into<String>, source: LlmError) -> Self {
        LlmError::Request {
            model: model.into(),
            source: Box::new(source),
        }
    }

    /// Whether a single failed attempt may be retried.
    ///
    /// True for HTTP 429/503 and for timeouts or dropped connections. Wrapping
    /// errors are never retryable themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
            LlmError::Transport(e) => e.kind.is_transient(),
            _ => false,
        }
    }

    /// Whether the caller may reasonably try the same call again later.
    ///
    /// Exhausted retries are final even when the underlying cause was a
    /// rate limit.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LlmError::Request { source, .. } => source.is_recoverable(),
            LlmError::RetriesExhausted { .. } => false,
            other => other.is_retryable(),
        }
    }

    /// HTTP status of the innermost provider error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            LlmError::RetriesExhausted { source, .. } | LlmError::Request { source, .. } => {
                source.status()
            }
            _ => None,
        }
    }

    /// Short user-facing description for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            LlmError::Configuration(msg) => format!("Configuration problem: {msg}"),
            LlmError::Validation(msg) => format!("Invalid request: {msg}"),
            LlmError::Request { source, .. } | LlmError::RetriesExhausted { source, .. } => {
                source.user_message()
            }
            LlmError::Api { status: 429, .. } => {
                "The provider is rate limiting requests. Please wait a moment.".into()
            }
            LlmError::Api { status: 401 | 403, .. } => {
                "Authentication failed. Please check your API key.".into()
            }
            LlmError::Api { provider, status, .. } => {
                format!("The {provider} service returned HTTP {status}.")
            }
            LlmError::Transport(_) => "The provider could not be reached.".into(),
            LlmError::Parse { provider, .. } => {
                format!("The {provider} service returned an unexpected response.")
            }
        }
    }
}
