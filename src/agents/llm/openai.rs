//! OpenAI LLM Provider with streaming support

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{
    arguments_text, drain_sse_data, incomplete_stream, parse_arguments, resolve_api_key,
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmStream, LlmStreamSender,
    StreamChunk, ToolCallDelta,
};
use crate::agents::config::ModelConfig;
use crate::agents::domain::{Message, Role, TokenUsage, ToolCall, ToolSchema};
use crate::agents::error::{LlmError, LlmResult, ProviderError};

const PROVIDER: &str = "openai";

/// OpenAI LLM Provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    default_top_p: Option<f32>,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// Reads the API key but performs no network I/O.
    pub fn new(config: &ModelConfig) -> LlmResult<Self> {
        let api_key = resolve_api_key(PROVIDER, config.api_key_env.as_deref(), "OPENAI_API_KEY")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

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

    /// Build the request body for OpenAI API
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire(&request.messages),
        });

        if let Some(temp) = request.temperature.or(self.default_temperature) {
            body["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens.or(self.default_max_tokens) {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(top_p) = request.top_p.or(self.default_top_p) {
            body["top_p"] = json!(top_p);
        }

        if let Some(stop) = &request.stop {
            body["stop"] = json!(stop);
        }

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = json!(tools.iter().map(tool_to_wire).collect::<Vec<_>>());
            }
        }

        if request.stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
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
            .post(format!("{}/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
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

/// Forward SSE payloads from a response body as stream chunks.
///
/// The body must reach `[DONE]` or a chunk carrying a finish reason;
/// anything shorter is an error.
async fn forward_events<S, B, E>(stream: S, sender: &LlmStreamSender) -> Result<(), LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    futures::pin_mut!(stream);
    let mut buffer = Vec::new();
    let mut finished = false;

    while let Some(chunk_result) = stream.next().await {
        let bytes = chunk_result.map_err(|e| LlmError::Streaming(e.to_string()))?;
        buffer.extend_from_slice(bytes.as_ref());

        for data in drain_sse_data(&mut buffer) {
            if data == "[DONE]" {
                return Ok(());
            }

            let Some(chunk) = parse_stream_payload(&data) else {
                continue;
            };
            finished |= chunk.is_final();

            if !sender.send(chunk).await {
                // Receiver dropped
                return Ok(());
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
impl LlmProvider for OpenAiProvider {
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

        let openai_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| Self::error(LlmError::Parse(format!("Failed to parse response: {}", e))))?;

        parse_response(openai_response).map_err(Self::error)
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

fn tool_to_wire(tool: &ToolSchema) -> Value {
    // OpenAI requires at minimum {"type": "object"} for function parameters
    let params = if tool.parameters.as_object().map_or(true, |o| o.is_empty()) {
        json!({ "type": "object", "properties": {} })
    } else if tool.parameters.get("type").is_none() {
        let mut p = tool.parameters.clone();
        if let Some(obj) = p.as_object_mut() {
            obj.insert("type".to_string(), json!("object"));
        }
        p
    } else {
        tool.parameters.clone()
    };

    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": params
        }
    })
}

/// Convert canonical messages to OpenAI chat messages
pub fn to_wire(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({
                "role": m.role.to_string(),
                "content": m.content,
            });

            if let Some(tool_calls) = &m.tool_calls {
                msg["tool_calls"] = json!(tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": arguments_text(&tc.arguments)
                            }
                        })
                    })
                    .collect::<Vec<_>>());
            }

            if let Some(tool_call_id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(tool_call_id);
            }

            msg
        })
        .collect()
}

/// Convert OpenAI chat messages back to canonical messages
pub fn from_wire(messages: &[Value]) -> Result<Vec<Message>, LlmError> {
    messages
        .iter()
        .map(|value| {
            let wire: WireMessage = serde_json::from_value(value.clone())
                .map_err(|e| LlmError::Parse(format!("Invalid OpenAI message: {}", e)))?;

            let role = match wire.role.as_str() {
                "system" | "developer" => Role::System,
                "user" => Role::User,
                "assistant" => Role::Assistant,
                "tool" => Role::Tool,
                other => return Err(LlmError::Parse(format!("Unknown role: {}", other))),
            };

            let tool_calls = wire.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
                    .collect::<Vec<_>>()
            });

            Ok(Message {
                role,
                content: wire.content.unwrap_or_default(),
                tool_calls: tool_calls.filter(|calls| !calls.is_empty()),
                tool_call_id: wire.tool_call_id,
                metadata: None,
            })
        })
        .collect()
}

fn map_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("tool_calls") | Some("function_call") => FinishReason::ToolCalls,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Parse a non-streaming response
fn parse_response(response: OpenAiResponse) -> Result<CompletionResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Parse("No choices in response".to_string()))?;

    let tool_calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
        .collect();

    let usage = response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(CompletionResponse {
        message: Message::assistant_with_tools(choice.message.content.unwrap_or_default(), tool_calls),
        finish_reason: map_finish_reason(choice.finish_reason.as_deref()),
        usage,
    })
}

/// Parse one SSE data payload into a stream chunk
fn parse_stream_payload(data: &str) -> Option<StreamChunk> {
    let parsed: OpenAiStreamResponse = serde_json::from_str(data).ok()?;

    let mut chunk = StreamChunk::default();

    if let Some(choice) = parsed.choices.first() {
        chunk.content = choice.delta.content.clone().unwrap_or_default();

        for tc in choice.delta.tool_calls.iter().flatten() {
            let mut delta = ToolCallDelta::new(tc.index);
            if let Some(id) = &tc.id {
                delta = delta.with_id(id);
            }
            if let Some(func) = &tc.function {
                if let Some(name) = &func.name {
                    delta = delta.with_name(name);
                }
                if let Some(args) = &func.arguments {
                    delta = delta.with_arguments(args);
                }
            }
            chunk.tool_calls.push(delta);
        }

        if let Some(reason) = &choice.finish_reason {
            chunk.finish_reason = Some(map_finish_reason(Some(reason)));
        }
    }

    // Usage arrives in a trailing chunk with no choices
    if let Some(usage) = &parsed.usage {
        chunk.usage = Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens));
    }

    Some(chunk)
}

// OpenAI API wire types

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
    tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::config::ProviderKind;
    use crate::agents::domain::ToolResult;

    fn provider() -> OpenAiProvider {
        OpenAiProvider {
            client: reqwest::Client::new(),
            api_key: "test".to_string(),
            base_url: "http://localhost".to_string(),
            model: "gpt-4o".to_string(),
            default_temperature: Some(0.7),
            default_max_tokens: None,
            default_top_p: None,
        }
    }

    fn conversation() -> Vec<Message> {
        let call = ToolCall::new("call_1", "calculator", json!({ "expression": "2+2" }));
        vec![
            Message::system("You are helpful."),
            Message::user("What is 2+2?"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool_result(&ToolResult::success("call_1", "calculator", json!(4), 1)),
            Message::assistant("The result is 4"),
        ]
    }

    #[test]
    fn test_wire_round_trip_preserves_roles_and_linkage() {
        let messages = conversation();
        let wire = to_wire(&messages);

        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], "{\"expression\":\"2+2\"}");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "call_1");

        let back = from_wire(&wire).unwrap();
        assert_eq!(back, messages);
    }

    #[test]
    fn test_request_body_includes_tools_and_defaults() {
        let request = CompletionRequest {
            messages: vec![Message::user("hi")],
            max_tokens: Some(256),
            tools: Some(vec![ToolSchema::new("current_time", "Get the time", json!({}))]),
            ..Default::default()
        };

        let body = provider().build_request_body(&request);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 256);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["tools"][0]["function"]["parameters"]["type"], "object");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": { "name": "calculator", "arguments": "{\"expression\":\"2+2\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 20, "completion_tokens": 7, "total_tokens": 27 }
        }))
        .unwrap();

        let response = parse_response(raw).unwrap();
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.usage, TokenUsage::new(20, 7));
        let calls = response.message.requested_tools();
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].arguments["expression"], "2+2");
        assert_eq!(response.content(), "");
    }

    #[test]
    fn test_parse_stream_payloads() {
        let chunk = parse_stream_payload(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"calculator","arguments":""}}]},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.tool_calls[0].name.as_deref(), Some("calculator"));

        let usage = parse_stream_payload(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(usage.usage, Some(TokenUsage::new(3, 2)));
    }

    fn body(parts: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, std::convert::Infallible>> {
        futures::stream::iter(parts.iter().map(|p| Ok(p.to_vec())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_stream_keeps_multibyte_text_split_across_chunks() {
        let raw = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"café\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        )
        .as_bytes();
        let split = raw.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let (sender, stream) = LlmStream::channel(16);
        forward_events(body(&[&raw[..split], &raw[split..]]), &sender)
            .await
            .unwrap();
        drop(sender);

        let response = stream.collect().await.unwrap();
        assert_eq!(response.content(), "café");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let raw = b"data: {\"choices\":[{\"delta\":{\"content\":\"The answer is\"},\"finish_reason\":null}]}\n\n";
        let (sender, _stream) = LlmStream::channel(16);

        let err = forward_events(body(&[&raw[..]]), &sender).await.unwrap_err();
        assert!(matches!(err, LlmError::Streaming(ref m) if m.contains("ended before completion")));
    }

    #[test]
    fn test_new_reads_configured_key_var() {
        std::env::set_var("CONDUCTOR_TEST_OPENAI_KEY", "sk-test");
        let mut config = ModelConfig::new(ProviderKind::OpenAI, "gpt-4o-mini");
        config.api_key_env = Some("CONDUCTOR_TEST_OPENAI_KEY".to_string());

        let provider = OpenAiProvider::new(&config).unwrap();
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert_eq!(provider.api_key, "sk-test");
    }
}
