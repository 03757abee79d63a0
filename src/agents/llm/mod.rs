//! LLM provider clients with streaming support
//!
//! Every backend normalizes its own wire format into the same
//! `CompletionRequest` / `CompletionResponse` protocol:
//! - OpenAI chat completions (and compatible endpoints)
//! - Anthropic messages
//! - Mock (deterministic, offline)

mod anthropic;
mod mock;
mod openai;
mod registry;
mod stream;

pub use anthropic::AnthropicProvider;
pub use mock::{MockProvider, MockResponse};
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use stream::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

use crate::agents::config::{ModelConfig, ProviderKind};
use crate::agents::domain::{Message, TokenUsage, ToolSchema};
use crate::agents::error::{LlmError, LlmResult, ProviderError};

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Complete a request (non-streaming)
    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse>;

    /// Complete a request with streaming.
    ///
    /// Collecting the stream yields the same response `complete` would.
    fn complete_stream(&self, request: CompletionRequest) -> LlmStream;
}

/// Request for LLM completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Tools available for calling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

/// Response from LLM completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated message (content plus any requested tool calls)
    pub message: Message,
    /// Reason the completion stopped
    pub finish_reason: FinishReason,
    /// Token usage for this round-trip
    #[serde(default)]
    pub usage: TokenUsage,
}

impl CompletionResponse {
    pub fn content(&self) -> &str {
        &self.message.content
    }
}

/// Reason completion stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Hit max tokens
    Length,
    /// Tool call requested
    ToolCalls,
    /// Content filtered
    ContentFilter,
}

/// Create an LLM provider from configuration
pub fn create_provider(config: &ModelConfig) -> LlmResult<Arc<dyn LlmProvider>> {
    match config.provider {
        ProviderKind::OpenAI => Ok(Arc::new(OpenAiProvider::new(config)?)),
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicProvider::new(config)?)),
        ProviderKind::Mock => Ok(Arc::new(MockProvider::new().with_model(&config.model))),
    }
}

/// Look up an API key from the configured variable or the provider default
pub(crate) fn resolve_api_key(
    provider: &str,
    configured: Option<&str>,
    default_var: &str,
) -> LlmResult<String> {
    let var = configured.unwrap_or(default_var);
    env::var(var).map_err(|_| {
        ProviderError::new(
            provider,
            LlmError::Authentication(format!("Environment variable {} not set", var)),
        )
    })
}

/// Split an SSE byte buffer into complete `data:` payloads, keeping any
/// partial trailing line in the buffer.
///
/// Lines are decoded only once complete, so a multibyte character split
/// across network chunks survives intact.
pub(crate) fn drain_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);

        if let Some(data) = line.trim().strip_prefix("data:") {
            payloads.push(data.trim_start().to_string());
        }
    }
    payloads
}

/// Error for a body that closed before the backend's terminal event
pub(crate) fn incomplete_stream() -> LlmError {
    LlmError::Streaming("stream ended before completion".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_sse_data_keeps_partial_line() {
        let mut buffer = b"event: ping\ndata: {\"a\":1}\n\ndata: {\"b\"".to_vec();
        let payloads = drain_sse_data(&mut buffer);
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
        assert_eq!(buffer, b"data: {\"b\"");

        buffer.extend_from_slice(b":2}\n");
        assert_eq!(drain_sse_data(&mut buffer), vec!["{\"b\":2}".to_string()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_sse_data_multibyte_split_across_chunks() {
        let line = "data: {\"text\":\"café\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut buffer = line[..split].to_vec();
        assert!(drain_sse_data(&mut buffer).is_empty());

        buffer.extend_from_slice(&line[split..]);
        assert_eq!(drain_sse_data(&mut buffer), vec!["{\"text\":\"café\"}".to_string()]);
    }

    #[test]
    fn test_create_mock_provider() {
        let provider = create_provider(&ModelConfig::mock()).unwrap();
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_missing_api_key_is_authentication_error() {
        let err = resolve_api_key("openai", Some("CONDUCTOR_TEST_UNSET_KEY_VAR"), "OPENAI_API_KEY")
            .unwrap_err();
        assert_eq!(err.provider, "openai");
        assert!(matches!(err.kind, LlmError::Authentication(_)));
    }
}
