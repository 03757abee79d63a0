//! Chat results and streaming types

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::{Message, ToolCall, ToolResult};
use crate::agents::error::AgentError;

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens used in the prompt/input
    pub input_tokens: u32,
    /// Tokens generated in the response
    pub output_tokens: u32,
    /// Total tokens used
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Add another usage report to this one
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens = self.input_tokens + self.output_tokens;
    }
}

/// Per-call options for `chat()`
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Conversation identifier; generated when absent
    pub conversation_id: Option<String>,
    /// Values rendered into the system prompt and its context block
    pub context: HashMap<String, Value>,
    /// Max tokens override for this call
    pub max_tokens: Option<u32>,
    /// Temperature override for this call
    pub temperature: Option<f32>,
    /// Prior conversation supplied by the caller
    pub history: Vec<Message>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Final result of one `chat()` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    /// Final assistant message
    pub message: Message,
    /// Every tool result produced during the call, in execution order
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    /// Conversation identifier
    pub conversation_id: String,
    /// Usage summed over every provider round-trip
    pub usage: TokenUsage,
    /// Number of provider round-trips
    pub iterations: u32,
}

/// A chunk of streaming output from a chat call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatChunk {
    /// Streamed text content
    Text { content: String },
    /// Tool call about to be executed
    ToolCall { call: ToolCall },
    /// Tool execution result
    ToolResult { result: ToolResult },
    /// Final complete result
    Complete { result: ChatResult },
}

impl ChatChunk {
    /// Create a text chunk
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }
}

/// Streaming response from a chat call
pub struct ChatStream {
    receiver: mpsc::Receiver<Result<ChatChunk, AgentError>>,
}

impl ChatStream {
    /// Create a channel pair for building a chat stream
    pub fn channel(buffer: usize) -> (ChatStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (ChatStreamSender { sender: tx }, Self { receiver: rx })
    }

    /// Drain the stream and return the final result
    pub async fn collect(mut self) -> Result<ChatResult, AgentError> {
        while let Some(item) = self.receiver.recv().await {
            if let ChatChunk::Complete { result } = item? {
                return Ok(result);
            }
        }
        Err(AgentError::Internal(
            "chat stream ended without a result".to_string(),
        ))
    }
}

impl Stream for ChatStream {
    type Item = Result<ChatChunk, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a chat stream
#[derive(Clone)]
pub struct ChatStreamSender {
    sender: mpsc::Sender<Result<ChatChunk, AgentError>>,
}

impl ChatStreamSender {
    /// Send a chunk; returns false once the receiver is gone
    pub async fn send(&self, chunk: ChatChunk) -> bool {
        self.sender.send(Ok(chunk)).await.is_ok()
    }

    /// Send an error
    pub async fn send_error(&self, error: AgentError) -> bool {
        self.sender.send(Err(error)).await.is_ok()
    }
}
