//! Anthropic LLM Provider with streaming support

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    drain_sse_data, incomplete_stream, resolve_api_key, CompletionRequest, CompletionResponse,
    FinishReason, LlmProvider, LlmStream, LlmStreamSender, StreamChunk, ToolCallDelta,
};
use crate::agents::config::ModelConfig;
use crate::agents::domain::{Message, Role, TokenUsage, ToolCall};
use crate::agents::error::{LlmError, LlmResult, ProviderError};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic LLM Provider
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    default_top_p: Option<f32>,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// Reads the API key but performs no network I/O.
    pub fn new(config: &ModelConfig) -> LlmResult<Self> {
        let api_key = resolve_api_key(PROVIDER, config.api_key_env.as_deref(), "ANTHROPIC_API_KEY")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model: config.model.clone(),
            default_temperature: config.temperature,
            default_max_tokens: config.max_tokens,
            default_top_p: config.top_p,
        })
    }

    /// Build the request body for Anthropic API
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let (system_prompt, messages) = to_wire(&request.messages);

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens.or(self.default_max_tokens).unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        if let Some(temp) = request.temperature.or(self.default_temperature) {
            body["temperature"] = json!(temp);
        }

        if let Some(top_p) = request.top_p.or(self.default_top_p) {
            body["top_p"] = json!(top_p);
        }

        if let Some(stop) = &request.stop {
            body["stop_sequences"] = json!(stop);
        }

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = json!(tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters
                        })
                    })
                    .collect::<Vec<_>>());
            }
        }

        if request.stream {
            body["stream"] = json!(true);
        }

        body
    }

    fn error(kind: LlmError) -> ProviderError {
        ProviderError::new(PROVIDER, kind)
    }

    async fn post(
        client: &reqwest::Client,
        api_key: &str,
        base_url: &str,
        body: &Value,
    ) -> Result<reqwest::Response, LlmError> {
        let response = client
            .post(format!("{}/v1/messages", base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(response)
    }

    async fn stream_completion(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        body: Value,
        sender: LlmStreamSender,
    ) -> Result<(), LlmError> {
        let response = Self::post(&client, &api_key, &base_url, &body).await?;

        forward_events(response.bytes_stream(), &sender).await
    }
}

/// Forward SSE events from a response body as stream chunks.
///
/// The body must reach `message_stop` or a `message_delta` carrying a stop
/// reason; anything shorter is an error.
async fn forward_events<S, B, E>(stream: S, sender: &LlmStreamSender) -> Result<(), LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    futures::pin_mut!(stream);
    let mut buffer = Vec::new();
    let mut state = StreamState::default();
    let mut finished = false;

    while let Some(chunk_result) = stream.next().await {
        let bytes = chunk_result.map_err(|e| LlmError::Streaming(e.to_string()))?;
        buffer.extend_from_slice(bytes.as_ref());

        for data in drain_sse_data(&mut buffer) {
            let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(&data) else {
                continue;
            };

            if event.event_type == "error" {
                return Err(LlmError::Streaming(data));
            }
            if event.event_type == "message_stop" {
                return Ok(());
            }

            if let Some(chunk) = state.apply(event) {
                finished |= chunk.is_final();
                if !sender.send(chunk).await {
                    return Ok(());
                }
            }
        }
    }

    if finished {
        Ok(())
    } else {
        Err(incomplete_stream())
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let body = self.build_request_body(&request);

        let response = Self::post(&self.client, &self.api_key, &self.base_url, &body)
            .await
            .map_err(Self::error)?;

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| Self::error(LlmError::Parse(format!("Failed to parse response: {}", e))))?;

        Ok(parse_response(anthropic_response))
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        let (sender, stream) = LlmStream::channel(64);

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let mut req = request;
        req.stream = true;
        let body = self.build_request_body(&req);

        tokio::spawn(async move {
            let result = Self::stream_completion(client, api_key, base_url, body, sender.clone()).await;
            if let Err(e) = result {
                sender.send_error(Self::error(e)).await;
            }
        });

        stream
    }
}

/// Convert canonical messages to Anthropic format.
///
/// Returns `(system_prompt, messages)`. System messages are lifted into the
/// top-level `system` field (several are joined with a blank line); tool
/// results become `tool_result` blocks inside a user turn, with consecutive
/// results sharing one turn.
pub fn to_wire(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut converted: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    let flush = |pending: &mut Vec<Value>, converted: &mut Vec<Value>| {
        if !pending.is_empty() {
            converted.push(json!({
                "role": "user",
                "content": std::mem::take(pending)
            }));
        }
    };

    for m in messages {
        if m.role == Role::Tool {
            pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                "content": m.content
            }));
            continue;
        }

        flush(&mut pending_results, &mut converted);

        match m.role {
            Role::System => system_parts.push(&m.content),
            Role::User => converted.push(json!({
                "role": "user",
                "content": m.content
            })),
            Role::Assistant => match &m.tool_calls {
                Some(tool_calls) => {
                    let mut content = Vec::new();

                    if !m.content.is_empty() {
                        content.push(json!({ "type": "text", "text": m.content }));
                    }

                    for tc in tool_calls {
                        content.push(json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": wire_input(&tc.arguments)
                        }));
                    }

                    converted.push(json!({ "role": "assistant", "content": content }));
                }
                None => converted.push(json!({
                    "role": "assistant",
                    "content": m.content
                })),
            },
            Role::Tool => unreachable!("tool messages are buffered above"),
        }
    }

    flush(&mut pending_results, &mut converted);

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, converted)
}

/// Convert Anthropic messages back to canonical messages
pub fn from_wire(system: Option<&str>, messages: &[Value]) -> Result<Vec<Message>, LlmError> {
    let mut result = Vec::new();

    if let Some(system) = system {
        result.push(Message::system(system));
    }

    for value in messages {
        let wire: WireMessage = serde_json::from_value(value.clone())
            .map_err(|e| LlmError::Parse(format!("Invalid Anthropic message: {}", e)))?;

        let blocks = match wire.content {
            WireContent::Text(text) => {
                result.push(match wire.role.as_str() {
                    "assistant" => Message::assistant(text),
                    _ => Message::user(text),
                });
                continue;
            }
            WireContent::Blocks(blocks) => blocks,
        };

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in blocks {
            match block.block_type.as_str() {
                "text" => text.push_str(block.text.as_deref().unwrap_or_default()),
                "tool_use" => tool_calls.push(ToolCall::new(
                    block.id.unwrap_or_default(),
                    block.name.unwrap_or_default(),
                    block.input.unwrap_or_else(|| json!({})),
                )),
                "tool_result" => result.push(Message::tool(
                    block.tool_use_id.unwrap_or_default(),
                    tool_result_text(block.content),
                )),
                _ => {}
            }
        }

        if wire.role == "assistant" {
            result.push(Message::assistant_with_tools(text, tool_calls));
        } else if !text.is_empty() {
            result.push(Message::user(text));
        }
    }

    Ok(result)
}

fn tool_result_text(content: Option<Value>) -> String {
    match content {
        Some(Value::String(s)) => s,
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Parse a non-streaming response
fn parse_response(response: AnthropicResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block.block_type.as_str() {
            "text" => {
                if let Some(text) = &block.text {
                    content.push_str(text);
                }
            }
            "tool_use" => {
                if let (Some(id), Some(name)) = (block.id, block.name) {
                    tool_calls.push(ToolCall::new(id, name, block.input.unwrap_or_else(|| json!({}))));
                }
            }
            _ => {}
        }
    }

    CompletionResponse {
        message: Message::assistant_with_tools(content, tool_calls),
        finish_reason: map_stop_reason(response.stop_reason.as_deref()),
        usage: TokenUsage::new(response.usage.input_tokens, response.usage.output_tokens),
    }
}

/// Tool input must be an object on the wire; unparsed argument text is dropped.
fn wire_input(arguments: &Value) -> Value {
    if arguments.is_object() {
        arguments.clone()
    } else {
        json!({})
    }
}

/// Tracks tool-use block positions and input token counts across stream events
#[derive(Debug, Default)]
struct StreamState {
    tool_call_index: usize,
    input_tokens: u32,
}

impl StreamState {
    fn apply(&mut self, event: AnthropicStreamEvent) -> Option<StreamChunk> {
        match event.event_type.as_str() {
            "message_start" => {
                if let Some(usage) = event.message.and_then(|m| m.usage) {
                    self.input_tokens = usage.input_tokens.unwrap_or(0);
                }
                None
            }
            "content_block_start" => {
                let block = event.content_block?;
                if block.block_type != "tool_use" {
                    return None;
                }
                let delta = ToolCallDelta::new(self.tool_call_index)
                    .with_id(block.id.unwrap_or_default())
                    .with_name(block.name.unwrap_or_default());
                self.tool_call_index += 1;
                Some(StreamChunk::tool_call(delta))
            }
            "content_block_delta" => {
                let delta = event.delta?;
                match delta.delta_type.as_deref() {
                    Some("text_delta") => delta.text.map(StreamChunk::text),
                    Some("input_json_delta") => delta.partial_json.map(|partial| {
                        StreamChunk::tool_call(
                            ToolCallDelta::new(self.tool_call_index.saturating_sub(1))
                                .with_arguments(partial),
                        )
                    }),
                    _ => None,
                }
            }
            "message_delta" => {
                let stop_reason = event.delta.and_then(|d| d.stop_reason)?;
                let output_tokens = event.usage.and_then(|u| u.output_tokens).unwrap_or(0);
                Some(StreamChunk::finish(
                    map_stop_reason(Some(&stop_reason)),
                    Some(TokenUsage::new(self.input_tokens, output_tokens)),
                ))
            }
            _ => None,
        }
    }
}

// Anthropic API wire types

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: WireContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    id: Option<String>,
    name: Option<String>,
    input: Option<Value>,
    tool_use_id: Option<String>,
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    message: Option<StreamMessage>,
    content_block: Option<StreamContentBlock>,
    delta: Option<StreamDelta>,
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamMessage {
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
    partial_json: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::domain::ToolResult;

    fn provider() -> AnthropicProvider {
        AnthropicProvider {
            client: reqwest::Client::new(),
            api_key: "test".to_string(),
            base_url: "http://localhost".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            default_temperature: None,
            default_max_tokens: None,
            default_top_p: None,
        }
    }

    #[test]
    fn test_tool_results_grouped_into_one_user_turn() {
        let calls = vec![
            ToolCall::new("toolu_1", "calculator", json!({ "expression": "2+2" })),
            ToolCall::new("toolu_2", "current_time", json!({})),
        ];
        let messages = vec![
            Message::system("Be brief."),
            Message::user("Add and tell the time"),
            Message::assistant_with_tools("Let me check.", calls),
            Message::tool_result(&ToolResult::success("toolu_1", "calculator", json!(4), 0)),
            Message::tool_result(&ToolResult::failure("toolu_2", "current_time", "boom", 0)),
            Message::assistant("4, and the clock is broken"),
        ];

        let (system, wire) = to_wire(&messages);
        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[1]["content"][1]["type"], "tool_use");
        assert_eq!(wire[2]["role"], "user");
        assert_eq!(wire[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(wire[2]["content"][1]["content"], "Error: boom");

        let back = from_wire(system.as_deref(), &wire).unwrap();
        assert_eq!(back, messages);
    }

    #[test]
    fn test_request_body_defaults_max_tokens() {
        let request = CompletionRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            temperature: Some(0.2),
            ..Default::default()
        };
        let body = provider().build_request_body(&request);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_response_mixed_blocks() {
        let raw: AnthropicResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Calculating" },
                { "type": "tool_use", "id": "toolu_9", "name": "calculator", "input": { "expression": "3*3" } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 50, "output_tokens": 12 }
        }))
        .unwrap();

        let response = parse_response(raw);
        assert_eq!(response.content(), "Calculating");
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage.total_tokens, 62);
        assert_eq!(response.message.requested_tools()[0].name, "calculator");
    }

    #[test]
    fn test_stream_state_tracks_tool_blocks_and_usage() {
        let mut state = StreamState::default();
        let events = [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":30,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_1","name":"calculator"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"expression\":\"1+1\"}"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":9}}"#,
        ];

        let chunks: Vec<StreamChunk> = events
            .iter()
            .filter_map(|e| state.apply(serde_json::from_str(e).unwrap()))
            .collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].tool_calls[0].index, 0);
        assert_eq!(chunks[2].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(chunks[2].usage, Some(TokenUsage::new(30, 9)));
    }

    fn body(parts: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, std::convert::Infallible>> {
        futures::stream::iter(parts.iter().map(|p| Ok(p.to_vec())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_stream_keeps_multibyte_text_split_across_chunks() {
        let raw = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"résumé\"}}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":3}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        )
        .as_bytes();
        let split = raw.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let (sender, stream) = LlmStream::channel(16);
        forward_events(body(&[&raw[..split], &raw[split..]]), &sender)
            .await
            .unwrap();
        drop(sender);

        let response = stream.collect().await.unwrap();
        assert_eq!(response.content(), "résumé");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let raw = concat!(
            "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":12}}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Half an\"}}\n\n",
        )
        .as_bytes();
        let (sender, _stream) = LlmStream::channel(16);

        let err = forward_events(body(&[&raw[..]]), &sender).await.unwrap_err();
        assert!(matches!(err, LlmError::Streaming(ref m) if m.contains("ended before completion")));
    }

    #[tokio::test]
    async fn test_stream_error_event_is_returned() {
        let raw = b"data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\"}}\n\n";
        let (sender, _stream) = LlmStream::channel(16);

        let err = forward_events(body(&[&raw[..]]), &sender).await.unwrap_err();
        assert!(matches!(err, LlmError::Streaming(ref m) if m.contains("overloaded_error")));
    }
}
