//! Wire-format conversion for each supported backend.
//!
//! [`ProviderAdapter`] is a closed enum over the three variants. Each one is
//! pure conversion logic: it knows the endpoint, headers, request body, and
//! how to read a response or a stream payload. Sending the request is the
//! [`LlmClient`](crate::client::LlmClient)'s job.
//!
//! - [`openai`]: chat-completions format. `tool_calls` with JSON-string
//!   arguments, `tool` role messages, SSE terminated by `data: [DONE]`.
//! - [`anthropic`]: messages format. Top-level `system` string, typed
//!   content blocks (`text`, `tool_use`, `tool_result`), `content_block_delta`
//!   stream events.
//! - [`local`]: OpenAI-compatible server on a configurable base URL
//!   (default `http://localhost:11434`). Same JSON shape as [`openai`], zero cost.

pub mod anthropic;
pub mod local;
pub mod openai;

use crate::api::pricing::{PricingInfo, pricing_for};
use crate::api::streaming::DataDecoder;
use crate::api::transport::HttpRequest;
use crate::error::{LlmError, Result};
use crate::{ChatRequest, ChatResponse};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use anthropic::AnthropicAdapter;
pub use local::LocalAdapter;
pub use openai::OpenAiAdapter;

/// A supported backend.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Local,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Anthropic, Provider::Local];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Local => "local",
        }
    }

    /// Environment variable consulted when the config has no API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Local => "LOCAL_LLM_API_KEY",
        }
    }

    /// Cloud providers refuse unauthenticated requests; local servers usually don't care.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Provider::Local)
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => openai::OPENAI_BASE_URL,
            Provider::Anthropic => anthropic::ANTHROPIC_BASE_URL,
            Provider::Local => local::LOCAL_BASE_URL,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| {
                LlmError::Configuration(format!(
                    "unsupported provider '{s}' (supported: {})",
                    Provider::ALL.map(Provider::as_str).join(", ")
                ))
            })
    }
}

/// Sampling settings resolved by the client for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: Option<f32>,
    pub stream: bool,
}

/// Every documented finish-reason signal, per provider.
pub const FINISH_REASON_SIGNALS: &[(Provider, &str)] = &[
    (Provider::OpenAi, "stop"),
    (Provider::OpenAi, "length"),
    (Provider::OpenAi, "tool_calls"),
    (Provider::OpenAi, "function_call"),
    (Provider::OpenAi, "content_filter"),
    (Provider::Anthropic, "end_turn"),
    (Provider::Anthropic, "stop_sequence"),
    (Provider::Anthropic, "max_tokens"),
    (Provider::Anthropic, "tool_use"),
    (Provider::Anthropic, "refusal"),
    (Provider::Local, "stop"),
    (Provider::Local, "length"),
    (Provider::Local, "tool_calls"),
    (Provider::Local, "content_filter"),
];

/// Conversion logic for one configured backend.
#[derive(Debug, Clone)]
pub enum ProviderAdapter {
    OpenAi(OpenAiAdapter),
    Anthropic(AnthropicAdapter),
    Local(LocalAdapter),
}

impl ProviderAdapter {
    /// Build the adapter for `provider`. `api_key` must already be resolved.
    pub fn new(provider: Provider, api_key: Option<String>, base_url: Option<String>) -> Self {
        match provider {
            Provider::OpenAi => {
                ProviderAdapter::OpenAi(OpenAiAdapter::new(api_key.unwrap_or_default(), base_url))
            }
            Provider::Anthropic => ProviderAdapter::Anthropic(AnthropicAdapter::new(
                api_key.unwrap_or_default(),
                base_url,
            )),
            Provider::Local => ProviderAdapter::Local(LocalAdapter::new(api_key, base_url)),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ProviderAdapter::OpenAi(_) => Provider::OpenAi,
            ProviderAdapter::Anthropic(_) => Provider::Anthropic,
            ProviderAdapter::Local(_) => Provider::Local,
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            ProviderAdapter::OpenAi(a) => a.endpoint(),
            ProviderAdapter::Anthropic(a) => a.endpoint(),
            ProviderAdapter::Local(a) => a.endpoint(),
        }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        match self {
            ProviderAdapter::OpenAi(a) => a.headers(),
            ProviderAdapter::Anthropic(a) => a.headers(),
            ProviderAdapter::Local(a) => a.headers(),
        }
    }

    pub fn build_body(&self, request: &ChatRequest, options: &GenerationOptions) -> serde_json::Value {
        match self {
            ProviderAdapter::OpenAi(_) | ProviderAdapter::Local(_) => {
                openai::build_body(request, options)
            }
            ProviderAdapter::Anthropic(_) => anthropic::build_body(request, options),
        }
    }

    /// Assemble the full HTTP request for a call.
    pub fn http_request(&self, request: &ChatRequest, options: &GenerationOptions) -> HttpRequest {
        HttpRequest {
            url: self.endpoint(),
            headers: self.headers(),
            body: self.build_body(request, options),
        }
    }

    /// Parse a successful (2xx) response body.
    pub fn parse_response(&self, body: &str) -> Result<ChatResponse> {
        match self {
            ProviderAdapter::OpenAi(_) => openai::parse_response(Provider::OpenAi.as_str(), body),
            ProviderAdapter::Local(_) => openai::parse_response(Provider::Local.as_str(), body),
            ProviderAdapter::Anthropic(_) => anthropic::parse_response(body),
        }
    }

    /// Decoder for this provider's SSE `data:` payloads.
    pub fn stream_decoder(&self) -> DataDecoder {
        match self {
            ProviderAdapter::OpenAi(_) | ProviderAdapter::Local(_) => openai::decode_stream_data,
            ProviderAdapter::Anthropic(_) => anthropic::decode_stream_data,
        }
    }

    pub fn pricing(&self, model: &str) -> PricingInfo {
        pricing_for(self.provider(), model)
    }
}

/// Decode a JSON-string tool argument payload into an object.
///
/// Empty strings mean "no arguments"; anything that is not a JSON object is
/// rejected.
pub(crate) fn decode_arguments(
    provider: &str,
    tool: &str,
    raw: &str,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => arguments_object(provider, tool, value),
        Err(e) => Err(LlmError::parse(
            provider,
            format!("tool '{tool}' arguments are not valid JSON: {e}"),
        )),
    }
}

/// Accept an already-decoded argument value if it is an object (or null).
pub(crate) fn arguments_object(
    provider: &str,
    tool: &str,
    value: serde_json::Value,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        other => Err(LlmError::parse(
            provider,
            format!("tool '{tool}' arguments must be a JSON object, got {other}"),
        )),
    }
}
