//! OpenAI chat-completions wire format.
//!
//! Also used verbatim by the [`local`](super::local) adapter, since
//! OpenAI-compatible servers accept the same JSON.

use super::{GenerationOptions, decode_arguments};
use crate::api::streaming::StreamData;
use crate::error::{LlmError, Result};
use crate::{
    ChatRequest, ChatResponse, FinishReason, Message, MessageRole, TokenUsage, ToolCall,
    ToolDefinition,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Adapter for the hosted OpenAI API.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    api_key: String,
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        )]
    }
}

// ── Request wire types ─────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct WireMessage {
    role: MessageRole,
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Debug)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: WireFunctionDef,
}

#[derive(Serialize, Debug)]
struct WireFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ── Response wire types ────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    #[serde(default)]
    choices: Vec<RawChoice>,
    usage: Option<RawUsage>,
    error: Option<RawApiError>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct RawApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<RawApiError>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}

// ── Conversion ─────────────────────────────────────────────────────

fn convert_tool_call(call: &ToolCall) -> WireToolCall {
    WireToolCall {
        id: call.id.clone(),
        call_type: function_type(),
        function: WireFunctionCall {
            name: call.name.clone(),
            arguments: call.arguments_json(),
        },
    }
}

/// Convert messages 1:1, keeping system messages inline.
pub(crate) fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| match m.role {
            MessageRole::Assistant if !m.tool_calls().is_empty() => WireMessage {
                role: MessageRole::Assistant,
                // OpenAI expects null, not "", next to tool calls.
                content: (!m.content.is_empty()).then(|| m.content.clone()),
                tool_calls: Some(m.tool_calls().iter().map(convert_tool_call).collect()),
                tool_call_id: None,
            },
            MessageRole::Tool => WireMessage {
                role: MessageRole::Tool,
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: Some(m.tool_call_id.clone().unwrap_or_default()),
            },
            role => WireMessage {
                role,
                content: Some(m.content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|t| WireTool {
            tool_type: "function",
            function: WireFunctionDef {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters_schema(),
            },
        })
        .collect()
}

pub(crate) fn build_body(request: &ChatRequest, options: &GenerationOptions) -> serde_json::Value {
    let tools = request.tools();
    let body = WireRequest {
        model: &options.model,
        messages: convert_messages(&request.messages),
        tools: (!tools.is_empty()).then(|| convert_tools(tools)),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
        top_p: options.top_p,
        stream: options.stream,
    };
    serde_json::to_value(&body).unwrap_or_else(|_| serde_json::json!({}))
}

/// Normalize a chat-completions `finish_reason`.
pub fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls" | "function_call") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

fn extract_tool_calls(provider: &str, calls: Vec<WireToolCall>) -> Result<Vec<ToolCall>> {
    calls
        .into_iter()
        .map(|c| {
            let arguments = decode_arguments(provider, &c.function.name, &c.function.arguments)?;
            Ok(ToolCall::new(c.id, c.function.name, arguments))
        })
        .collect()
}

/// Parse a chat-completions response body. `provider` labels errors.
pub(crate) fn parse_response(provider: &str, body: &str) -> Result<ChatResponse> {
    let parsed: RawChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::parse(provider, e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(LlmError::parse(provider, format!("API error: {}", err.message)));
    }

    let usage = parsed.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u
            .total_tokens
            .unwrap_or(u.prompt_tokens + u.completion_tokens),
    });

    let Some(choice) = parsed.choices.into_iter().next() else {
        return Err(LlmError::parse(provider, "response contained no choices"));
    };

    let tool_calls = extract_tool_calls(provider, choice.message.tool_calls.unwrap_or_default())?;
    let finish_reason = map_finish_reason(choice.finish_reason.as_deref());
    debug!(
        "{provider} output: {} chars text, {} tool call(s), finish={finish_reason}",
        choice.message.content.as_ref().map_or(0, String::len),
        tool_calls.len()
    );

    Ok(ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        finish_reason,
        usage,
    })
}

/// Decode one streaming chunk; only `choices[0].delta.content` is surfaced.
pub(crate) fn decode_stream_data(data: &str) -> StreamData {
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(StreamChunk {
            error: Some(err), ..
        }) => StreamData::Malformed(format!("API error: {}", err.message)),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .map_or(StreamData::Ignore, StreamData::Text),
        Err(e) => StreamData::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parameter;
    use serde_json::json;

    fn options(stream: bool) -> GenerationOptions {
        GenerationOptions {
            model: "gpt-4o".into(),
            temperature: 0.2,
            max_tokens: 256,
            top_p: Some(0.9),
            stream,
        }
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, name, args.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn body_carries_sampling_and_tools() {
        let request = ChatRequest::new(vec![Message::system("sys"), Message::user("hi")])
            .with_tools(vec![
                ToolDefinition::new("lookup", "Look it up")
                    .with_parameter(Parameter::new("q", "string", "query").required()),
            ]);
        let body = build_body(&request, &options(false));

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 256);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(
            body["tools"][0]["function"]["parameters"]["required"],
            json!(["q"])
        );

        let streaming = build_body(&request, &options(true));
        assert_eq!(streaming["stream"], true);
    }

    #[test]
    fn tool_messages_convert() {
        let messages = vec![
            Message::user("read it"),
            Message::assistant_tool_calls("", vec![call("call_1", "read_file", json!({"path": "a.rs"}))]),
            Message::tool_result("call_1", "fn main() {}"),
        ];
        let wire = serde_json::to_value(convert_messages(&messages)).unwrap();

        assert_eq!(wire[1]["content"], serde_json::Value::Null);
        assert_eq!(wire[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[1]["tool_calls"][0]["type"], "function");
        assert_eq!(
            wire[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"path":"a.rs"}"#
        );
        assert_eq!(wire[2]["role"], "tool");
        assert_eq!(wire[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn tool_call_round_trip() {
        let original = call("call_9", "search", json!({"query": "retry", "limit": 3}));
        let messages = vec![
            Message::assistant_tool_calls("Let me search.", vec![original.clone()]),
            Message::tool_result("call_9", "3 hits"),
        ];
        let wire = convert_messages(&messages);

        // Echo the assistant turn back as a provider response.
        let response = json!({
            "choices": [{ "message": wire[0], "finish_reason": "tool_calls" }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let parsed = parse_response("openai", &response.to_string()).unwrap();

        assert_eq!(parsed.tool_calls, vec![original]);
        assert_eq!(parsed.content, "Let me search.");
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(wire[1].tool_call_id.as_deref(), Some("call_9"));
    }

    #[test]
    fn parse_text_response() {
        let body = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        });
        let parsed = parse_response("openai", &body.to_string()).unwrap();
        assert_eq!(parsed.content, "Hello!");
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.usage, TokenUsage::new(12, 3));
    }

    #[test]
    fn parse_missing_usage_defaults_to_zero() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": "x" }, "finish_reason": "length" }]
        });
        let parsed = parse_response("local", &body.to_string()).unwrap();
        assert_eq!(parsed.usage, TokenUsage::default());
        assert_eq!(parsed.finish_reason, FinishReason::Length);
    }

    #[test]
    fn parse_rejects_empty_choices_and_bad_arguments() {
        assert!(parse_response("openai", r#"{"choices": []}"#).is_err());
        assert!(parse_response("openai", "not json").is_err());

        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{ "id": "c", "type": "function",
                                     "function": { "name": "f", "arguments": "{oops" } }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let err = parse_response("openai", &body.to_string()).unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("stop")), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("length")), FinishReason::Length);
        assert_eq!(map_finish_reason(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason(Some("function_call")), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason(Some("content_filter")), FinishReason::Error);
    }

    #[test]
    fn stream_data_decoding() {
        assert_eq!(
            decode_stream_data(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            StreamData::Text("Hi".into())
        );
        assert_eq!(
            decode_stream_data(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            StreamData::Ignore
        );
        assert_eq!(
            decode_stream_data(r#"{"choices":[],"usage":{"prompt_tokens":1}}"#),
            StreamData::Ignore
        );
        assert!(matches!(decode_stream_data("{nope"), StreamData::Malformed(_)));
        assert!(matches!(
            decode_stream_data(r#"{"error":{"message":"overloaded"}}"#),
            StreamData::Malformed(_)
        ));
    }

    #[test]
    fn adapter_endpoint_and_auth() {
        let adapter = OpenAiAdapter::new("sk-test", Some("https://proxy.example/v1/".into()));
        assert_eq!(adapter.endpoint(), "https://proxy.example/v1/chat/completions");
        assert_eq!(adapter.headers()[0].1, "Bearer sk-test");
        assert_eq!(
            OpenAiAdapter::new("k", None).endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
