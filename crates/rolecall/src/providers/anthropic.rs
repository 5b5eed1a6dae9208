//! Anthropic messages API wire format.

use super::{GenerationOptions, arguments_object};
use crate::api::streaming::StreamData;
use crate::error::{LlmError, Result};
use crate::{ChatRequest, ChatResponse, FinishReason, Message, MessageRole, TokenUsage, ToolCall};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Value sent in the `anthropic-version` header.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// The messages API caps temperature at 1.0.
const MAX_TEMPERATURE: f32 = 1.0;

const PROVIDER: &str = "anthropic";

/// Adapter for the Anthropic messages API.
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    api_key: String,
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
        ]
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum WireRole {
    User,
    Assistant,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
struct WireMessage {
    role: WireRole,
    content: Vec<ContentBlock>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// Block types this client does not surface (e.g. `thinking`).
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Debug)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct RawMessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<RawUsage>,
    error: Option<RawApiError>,
}

#[derive(Deserialize, Debug)]
struct RawUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct RawApiError {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

/// Streaming events. Only text deltas and the stop event matter here.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: StreamDelta },
    MessageStop,
    Error { error: RawApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

// ── Conversion ─────────────────────────────────────────────────────

/// Converted conversation: the top-level system prompt plus alternating turns.
#[derive(Debug, Default)]
struct Conversation {
    system: Option<String>,
    messages: Vec<WireMessage>,
}

impl Conversation {
    /// Append a block, merging into the previous turn when the role repeats.
    fn push(&mut self, role: WireRole, block: ContentBlock) {
        match self.messages.last_mut() {
            Some(last) if last.role == role => last.content.push(block),
            _ => self.messages.push(WireMessage {
                role,
                content: vec![block],
            }),
        }
    }

    /// Append a text block unless it is blank.
    fn push_text(&mut self, role: WireRole, text: &str) {
        if text.trim().is_empty() {
            debug!("Dropping blank {role:?} text block");
            return;
        }
        self.push(
            role,
            ContentBlock::Text {
                text: text.to_string(),
            },
        );
    }
}

fn convert_messages(messages: &[Message]) -> Conversation {
    let mut conv = Conversation::default();
    for m in messages {
        match m.role {
            MessageRole::System => {
                if conv.system.is_none() {
                    conv.system = Some(m.content.clone());
                } else {
                    debug!("Dropping additional system message ({} chars)", m.content.len());
                }
            }
            MessageRole::User => conv.push_text(WireRole::User, &m.content),
            MessageRole::Assistant => {
                conv.push_text(WireRole::Assistant, &m.content);
                for call in m.tool_calls() {
                    conv.push(
                        WireRole::Assistant,
                        ContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: serde_json::Value::Object(call.arguments.clone()),
                        },
                    );
                }
            }
            MessageRole::Tool => {
                let tool_use_id = m.tool_call_id.clone().unwrap_or_else(|| {
                    debug!("Tool result without a call id; sending an empty id");
                    String::new()
                });
                conv.push(
                    WireRole::User,
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content: m.content.clone(),
                    },
                );
            }
        }
    }
    conv
}

pub(crate) fn build_body(request: &ChatRequest, options: &GenerationOptions) -> serde_json::Value {
    let conv = convert_messages(&request.messages);
    let tools = request.tools();

    let mut temperature = options.temperature;
    if temperature > MAX_TEMPERATURE {
        debug!("Clamping temperature {temperature} to {MAX_TEMPERATURE} for {PROVIDER}");
        temperature = MAX_TEMPERATURE;
    }

    let body = WireRequest {
        model: &options.model,
        max_tokens: options.max_tokens,
        system: conv.system,
        messages: conv.messages,
        tools: (!tools.is_empty()).then(|| {
            tools
                .iter()
                .map(|t| WireTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters_schema(),
                })
                .collect()
        }),
        temperature,
        top_p: options.top_p,
        stream: options.stream,
    };
    serde_json::to_value(&body).unwrap_or_else(|_| serde_json::json!({}))
}

/// Normalize a messages-API `stop_reason`.
pub fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::Error,
        _ => FinishReason::Stop,
    }
}

pub(crate) fn parse_response(body: &str) -> Result<ChatResponse> {
    let parsed: RawMessageResponse =
        serde_json::from_str(body).map_err(|e| LlmError::parse(PROVIDER, e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(LlmError::parse(
            PROVIDER,
            format!("API error ({}): {}", err.kind, err.message),
        ));
    }

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in parsed.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = arguments_object(PROVIDER, &name, input)?;
                tool_calls.push(ToolCall::new(id, name, arguments));
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Unknown => {}
        }
    }

    let usage = parsed
        .usage
        .map_or_else(TokenUsage::default, |u| TokenUsage::new(u.input_tokens, u.output_tokens));
    let finish_reason = map_finish_reason(parsed.stop_reason.as_deref());
    debug!(
        "{PROVIDER} output: {} chars text, {} tool call(s), finish={finish_reason}",
        content.len(),
        tool_calls.len()
    );

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
    })
}

pub(crate) fn decode_stream_data(data: &str) -> StreamData {
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent::ContentBlockDelta {
            delta: StreamDelta::TextDelta { text },
        }) => StreamData::Text(text),
        Ok(StreamEvent::MessageStop) => StreamData::Done,
        Ok(StreamEvent::Error { error }) => {
            StreamData::Malformed(format!("API error ({}): {}", error.kind, error.message))
        }
        Ok(_) => StreamData::Ignore,
        Err(e) => StreamData::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDefinition;
    use serde_json::json;

    fn options() -> GenerationOptions {
        GenerationOptions {
            model: "claude-3-haiku-20240307".into(),
            temperature: 0.5,
            max_tokens: 1024,
            top_p: None,
            stream: false,
        }
    }

    #[test]
    fn system_is_lifted_out_of_messages() {
        let request = ChatRequest::new(vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::system("ignored"),
        ]);
        let body = build_body(&request, &options());
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["text"], "hi");
    }

    #[test]
    fn temperature_is_clamped() {
        let mut opts = options();
        opts.temperature = 1.7;
        let body = build_body(&ChatRequest::new(vec![Message::user("x")]), &opts);
        assert_eq!(body["temperature"], 1.0);
    }

    #[test]
    fn tools_use_input_schema() {
        let request = ChatRequest::new(vec![Message::user("x")])
            .with_tools(vec![ToolDefinition::new("ls", "List files")]);
        let body = build_body(&request, &options());
        assert_eq!(body["tools"][0]["name"], "ls");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn consecutive_tool_results_merge_into_one_user_turn() {
        let calls = vec![
            ToolCall::new("toolu_1", "a", serde_json::Map::new()),
            ToolCall::new("toolu_2", "b", serde_json::Map::new()),
        ];
        let request = ChatRequest::new(vec![
            Message::user("go"),
            Message::assistant_tool_calls("", calls),
            Message::tool_result("toolu_1", "one"),
            Message::tool_result("toolu_2", "two"),
        ]);
        let body = build_body(&request, &options());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][1]["type"], "tool_result");
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn blank_text_turns_are_dropped() {
        let request = ChatRequest::new(vec![
            Message::user("hi"),
            Message::assistant(""),
            Message::user("again"),
            Message::user("  "),
        ]);
        let body = build_body(&request, &options());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], json!([
            { "type": "text", "text": "hi" },
            { "type": "text", "text": "again" }
        ]));
    }

    #[tokio::test]
    async fn error_event_mid_stream_is_counted_as_skipped() {
        use crate::api::streaming::TextStream;
        use futures::StreamExt;

        let sse = concat!(
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: error\n",
            "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        );
        let chunks: Vec<std::result::Result<Vec<u8>, crate::api::transport::TransportError>> =
            vec![Ok(sse.as_bytes().to_vec())];
        let mut stream = TextStream::from_sse(
            Box::pin(futures::stream::iter(chunks)),
            decode_stream_data,
            PROVIDER,
            "claude-3-haiku-20240307".into(),
        );

        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment.unwrap());
        }
        assert_eq!(text, "Hel");
        assert_eq!(stream.skipped_chunks(), 1);
    }

    #[test]
    fn tool_call_round_trip() {
        let mut args = serde_json::Map::new();
        args.insert("path".into(), json!("src/lib.rs"));
        let original = ToolCall::new("toolu_01", "read_file", args);

        let conv = convert_messages(&[Message::assistant_tool_calls(
            "Reading.",
            vec![original.clone()],
        )]);
        let response = json!({
            "content": conv.messages[0].content,
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 40, "output_tokens": 12 }
        });
        let parsed = parse_response(&response.to_string()).unwrap();

        assert_eq!(parsed.content, "Reading.");
        assert_eq!(parsed.tool_calls, vec![original]);
        assert_eq!(parsed.finish_reason, FinishReason::ToolCalls);
        assert_eq!(parsed.usage, TokenUsage::new(40, 12));
    }

    #[test]
    fn parse_concatenates_text_and_skips_unknown_blocks() {
        let body = json!({
            "content": [
                { "type": "thinking", "thinking": "hmm" },
                { "type": "text", "text": "Hello, " },
                { "type": "text", "text": "world" }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 5, "output_tokens": 2 }
        });
        let parsed = parse_response(&body.to_string()).unwrap();
        assert_eq!(parsed.content, "Hello, world");
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.usage.total_tokens, 7);
    }

    #[test]
    fn parse_rejects_non_object_tool_input() {
        let body = json!({
            "content": [{ "type": "tool_use", "id": "t", "name": "f", "input": [1] }],
            "stop_reason": "tool_use"
        });
        assert!(matches!(
            parse_response(&body.to_string()),
            Err(LlmError::Parse { .. })
        ));
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some("end_turn")), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("stop_sequence")), FinishReason::Stop);
        assert_eq!(map_finish_reason(Some("max_tokens")), FinishReason::Length);
        assert_eq!(map_finish_reason(Some("tool_use")), FinishReason::ToolCalls);
        assert_eq!(map_finish_reason(Some("refusal")), FinishReason::Error);
        assert_eq!(map_finish_reason(Some("pause_turn")), FinishReason::Stop);
    }

    #[test]
    fn stream_events() {
        assert_eq!(
            decode_stream_data(
                r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
            ),
            StreamData::Text("Hi".into())
        );
        assert_eq!(
            decode_stream_data(
                r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\""}}"#
            ),
            StreamData::Ignore
        );
        assert_eq!(decode_stream_data(r#"{"type":"ping"}"#), StreamData::Ignore);
        assert_eq!(decode_stream_data(r#"{"type":"message_stop"}"#), StreamData::Done);
        assert!(matches!(
            decode_stream_data(r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#),
            StreamData::Malformed(_)
        ));
        assert!(matches!(decode_stream_data("{"), StreamData::Malformed(_)));
    }

    #[test]
    fn adapter_headers() {
        let adapter = AnthropicAdapter::new("sk-ant", None);
        assert_eq!(adapter.endpoint(), "https://api.anthropic.com/v1/messages");
        let headers = adapter.headers();
        assert!(headers.contains(&("x-api-key".to_string(), "sk-ant".to_string())));
        assert!(headers.contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));
    }
}
