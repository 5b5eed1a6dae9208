//! Multi-provider LLM client with retry, streaming, and per-role cost accounting.
//!
//! `rolecall` puts one request/response contract in front of three backend
//! protocols: the OpenAI chat-completions API, the Anthropic messages API,
//! and a locally hosted OpenAI-compatible endpoint (Ollama, llama.cpp,
//! vLLM, ...). On top of that it layers exponential-backoff retry, lazy SSE
//! streaming, tool-call normalization, and usage/cost tracking for three
//! fixed agent roles: planner, executor, and reflector.
//!
//! # Getting started
//!
//! ```ignore
//! use rolecall::{ChatRequest, ClientConfig, Message, Role, RoleManager, RolesConfig};
//!
//! #[tokio::main]
//! async fn main() -> rolecall::Result<()> {
//!     let roles = RolesConfig {
//!         planner: ClientConfig::new("anthropic", "claude-3-5-sonnet-20241022"),
//!         executor: ClientConfig::new("openai", "gpt-4o-mini"),
//!         reflector: ClientConfig::new("local", "llama3.2"),
//!     };
//!     let manager = RoleManager::new(&roles)?;
//!
//!     let request = ChatRequest::new(vec![
//!         Message::system("You plan software changes."),
//!         Message::user("Outline a fix for the flaky login test."),
//!     ]);
//!     let response = manager.chat(Role::Planner, &request).await?;
//!     println!("{}", response.content);
//!     println!("{}", manager.usage_stats(Role::Planner).summary());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Build a client for one provider:** [`ClientFactory::create`](factory::ClientFactory::create)
//!   validates a [`ClientConfig`] and returns an [`LlmClient`](client::LlmClient).
//!   API keys fall back to `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`; see
//!   [`resolve_credential`](factory::resolve_credential).
//!
//! - **Stream tokens:** [`LlmClient::chat_stream`](client::LlmClient::chat_stream)
//!   returns a [`TextStream`](api::streaming::TextStream). Drop it or call
//!   `close()` to release the connection early.
//!
//! - **Track spend per role:** [`RoleManager`](roles::RoleManager) owns one
//!   client per [`Role`](roles::Role) and accumulates [`UsageStats`](roles::UsageStats).
//!
//! - **Tune retries:** [`RetryPolicy`](api::retry::RetryPolicy). Only 429, 503,
//!   timeouts, and dropped connections are retried.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Transport seam, SSE streaming, retry with backoff, pricing tables |
//! | [`providers`] | Wire-format conversion for OpenAI, Anthropic, and local endpoints |
//! | [`client`] | [`LlmClient`](client::LlmClient): validation, retried calls, cost math |
//! | [`factory`] | Config validation, credential resolution, client construction |
//! | [`roles`] | Three-role client ownership and usage accounting |
//! | [`config`] | Serializable client and role configuration |
//! | [`error`] | [`LlmError`] taxonomy |

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod providers;
pub mod roles;

use serde::{Deserialize, Serialize};

pub use client::LlmClient;
pub use config::{ClientConfig, RolesConfig};
pub use error::{LlmError, Result};
pub use factory::{ClientFactory, Environment, resolve_credential};
pub use providers::Provider;
pub use roles::{Role, RoleManager, UsageStats};

// ── Constants ──────────────────────────────────────────────────────

/// Sampling temperature used when neither the request nor the config sets one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Completion budget used when neither the request nor the config sets one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Transport timeout used when the config does not set one.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Inclusive temperature range accepted by every provider.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// `tool_call_id` is only meaningful for [`MessageRole::Tool`] and
/// `tool_calls` only for [`MessageRole::Assistant`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Assistant turn that requested tool calls, with optional leading text.
    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Result of executing the tool call `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(MessageRole::Tool, content)
        }
    }

    /// Tool calls carried by this message, empty for anything but assistant turns.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// One parameter of a tool, rendered into a JSON-schema property.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// JSON-schema type: `string`, `number`, `integer`, `boolean`, `array`, `object`.
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Element type for `array` parameters. Defaults to `string`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_type: Option<String>,
}

impl Parameter {
    /// An optional parameter.
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            enum_values: None,
            items_type: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_items(mut self, items_type: impl Into<String>) -> Self {
        self.items_type = Some(items_type.into());
        self
    }
}

/// A function the model may call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON schema of the parameter object, shared by every provider format.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            let mut prop = serde_json::json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                prop["enum"] = serde_json::json!(values);
            }
            if param.param_type == "array" {
                let items = param.items_type.as_deref().unwrap_or("string");
                prop["items"] = serde_json::json!({ "type": items });
            }
            if param.required {
                required.push(param.name.clone());
            }
            properties.insert(param.name.clone(), prop);
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A tool invocation requested by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments re-encoded as a JSON string (OpenAI wire form).
    pub fn arguments_json(&self) -> String {
        serde_json::Value::Object(self.arguments.clone()).to_string()
    }
}

// ── Request types ──────────────────────────────────────────────────

/// Provider-neutral chat request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Tool definitions, empty when none were given.
    pub fn tools(&self) -> &[ToolDefinition] {
        self.tools.as_deref().unwrap_or_default()
    }

    /// Check the request invariants without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(LlmError::Validation(
                "messages must contain at least one message".into(),
            ));
        }
        if let Some(t) = self.temperature
            && !TEMPERATURE_RANGE.contains(&t)
        {
            return Err(LlmError::Validation(format!(
                "temperature must be between 0 and 2, got {t}"
            )));
        }
        if self.max_tokens == Some(0) {
            return Err(LlmError::Validation("max_tokens must be at least 1".into()));
        }
        Ok(())
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Normalized reason a generation stopped.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::ToolCalls => write!(f, "tool_calls"),
            FinishReason::Error => write!(f, "error"),
        }
    }
}

/// Token usage statistics for one call.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Provider-neutral chat response.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}
