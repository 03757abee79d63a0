//! Streaming types for LLM responses

use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{CompletionResponse, FinishReason};
use crate::agents::domain::{Message, TokenUsage, ToolCall};
use crate::agents::error::ProviderError;

/// A chunk of streamed LLM response
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    /// Delta content (text being generated)
    pub content: String,
    /// Tool calls being made (partial or complete)
    pub tool_calls: Vec<ToolCallDelta>,
    /// Finish reason (if this is the final chunk)
    pub finish_reason: Option<FinishReason>,
    /// Token usage (usually only in final chunk)
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// Create a text content chunk
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a tool call chunk
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_calls: vec![delta],
            ..Default::default()
        }
    }

    /// Create a finish chunk
    pub fn finish(reason: FinishReason, usage: Option<TokenUsage>) -> Self {
        Self {
            finish_reason: Some(reason),
            usage,
            ..Default::default()
        }
    }

    /// Check if this is a final chunk
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Delta update for a tool call (streaming tool calls)
#[derive(Debug, Clone, Default)]
pub struct ToolCallDelta {
    /// Index of the tool call being updated
    pub index: usize,
    /// Tool call ID (may be partial)
    pub id: Option<String>,
    /// Tool name (may be partial)
    pub name: Option<String>,
    /// Arguments JSON string (partial, accumulated)
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, args: impl Into<String>) -> Self {
        self.arguments = Some(args.into());
        self
    }
}

/// Accumulator for building tool calls from streaming deltas
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    tool_calls: Vec<ToolCallBuilder>,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a delta update
    pub fn apply_delta(&mut self, delta: &ToolCallDelta) {
        while self.tool_calls.len() <= delta.index {
            self.tool_calls.push(ToolCallBuilder::default());
        }

        let builder = &mut self.tool_calls[delta.index];

        if let Some(id) = &delta.id {
            builder.id.push_str(id);
        }
        if let Some(name) = &delta.name {
            builder.name.push_str(name);
        }
        if let Some(args) = &delta.arguments {
            builder.arguments.push_str(args);
        }
    }

    /// Build the final tool calls
    pub fn build(self) -> Vec<ToolCall> {
        self.tool_calls
            .into_iter()
            .filter(|b| !b.id.is_empty() && !b.name.is_empty())
            .map(|b| ToolCall {
                id: b.id,
                name: b.name,
                arguments: parse_arguments(&b.arguments),
            })
            .collect()
    }
}

/// Parse a JSON argument string.
///
/// Empty input becomes `{}`. Malformed input is kept verbatim as a
/// `Value::String` so tool validation can report it.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Tool call arguments are not valid JSON");
        Value::String(raw.to_string())
    })
}

/// Argument text as sent on the wire; unparsed text is passed back unchanged.
pub(crate) fn arguments_text(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

/// Streaming response from an LLM provider
pub struct LlmStream {
    receiver: mpsc::Receiver<Result<StreamChunk, ProviderError>>,
}

impl LlmStream {
    /// Create a channel pair for building an LLM stream
    pub fn channel(buffer: usize) -> (LlmStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (LlmStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// Stream an already complete response as a single burst
    pub fn from_response(response: CompletionResponse) -> Self {
        let chunks = response_chunks(response);
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Capacity covers every chunk.
            let _ = tx.try_send(Ok(chunk));
        }
        Self { receiver: rx }
    }

    /// Stream a single error
    pub fn from_error(error: ProviderError) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(Err(error));
        Self { receiver: rx }
    }

    /// Collect all chunks into a complete response
    pub async fn collect(mut self) -> Result<CompletionResponse, ProviderError> {
        let mut content = String::new();
        let mut tool_accumulator = ToolCallAccumulator::new();
        let mut finish_reason = None;
        let mut usage = TokenUsage::default();

        while let Some(result) = self.receiver.recv().await {
            let chunk = result?;

            content.push_str(&chunk.content);

            for delta in &chunk.tool_calls {
                tool_accumulator.apply_delta(delta);
            }

            if let Some(reason) = chunk.finish_reason {
                finish_reason = Some(reason);
            }

            if let Some(u) = chunk.usage {
                usage = u;
            }
        }

        let tool_calls = tool_accumulator.build();
        let finish_reason = finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });

        Ok(CompletionResponse {
            message: Message::assistant_with_tools(content, tool_calls),
            finish_reason,
            usage,
        })
    }
}

fn response_chunks(response: CompletionResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    if !response.message.content.is_empty() {
        chunks.push(StreamChunk::text(response.message.content.clone()));
    }
    for (index, call) in response.message.requested_tools().iter().enumerate() {
        chunks.push(StreamChunk::tool_call(
            ToolCallDelta::new(index)
                .with_id(&call.id)
                .with_name(&call.name)
                .with_arguments(arguments_text(&call.arguments)),
        ));
    }
    chunks.push(StreamChunk::finish(response.finish_reason, Some(response.usage)));
    chunks
}

impl Stream for LlmStream {
    type Item = Result<StreamChunk, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building an LLM stream
#[derive(Clone)]
pub struct LlmStreamSender {
    sender: mpsc::Sender<Result<StreamChunk, ProviderError>>,
}

impl LlmStreamSender {
    /// Send a chunk; returns false once the receiver is gone
    pub async fn send(&self, chunk: StreamChunk) -> bool {
        self.sender.send(Ok(chunk)).await.is_ok()
    }

    /// Send an error
    pub async fn send_error(&self, error: ProviderError) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulator_joins_partial_arguments() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply_delta(&ToolCallDelta::new(0).with_id("call_1").with_name("calculator"));
        acc.apply_delta(&ToolCallDelta::new(0).with_arguments("{\"expres"));
        acc.apply_delta(&ToolCallDelta::new(0).with_arguments("sion\":\"2+2\"}"));

        let calls = acc.build();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, json!({ "expression": "2+2" }));
    }

    #[test]
    fn test_accumulator_drops_nameless_calls() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply_delta(&ToolCallDelta::new(1).with_id("call_2").with_name("x"));
        // index 0 never received an id or name
        assert_eq!(acc.build().len(), 1);
    }

    #[test]
    fn test_malformed_arguments_kept_verbatim() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply_delta(&ToolCallDelta::new(0).with_id("call_1").with_name("calculator"));
        acc.apply_delta(&ToolCallDelta::new(0).with_arguments("{\"expression\": \"2+"));

        let calls = acc.build();
        assert_eq!(calls[0].arguments, json!("{\"expression\": \"2+"));
        assert_eq!(arguments_text(&calls[0].arguments), "{\"expression\": \"2+");
        assert_eq!(parse_arguments("  "), json!({}));
    }

    #[tokio::test]
    async fn test_from_response_collects_back() {
        let response = CompletionResponse {
            message: Message::assistant_with_tools(
                "thinking",
                vec![ToolCall::new("call_1", "calculator", json!({ "expression": "1+1" }))],
            ),
            finish_reason: FinishReason::ToolCalls,
            usage: TokenUsage::new(12, 4),
        };

        let collected = LlmStream::from_response(response.clone()).collect().await.unwrap();
        assert_eq!(collected.message, response.message);
        assert_eq!(collected.finish_reason, FinishReason::ToolCalls);
        assert_eq!(collected.usage, TokenUsage::new(12, 4));
    }
}
