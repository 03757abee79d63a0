//! Deterministic offline provider
//!
//! Responses come from two sources, checked in order:
//! 1. a FIFO script, consumed one entry per request
//! 2. a pattern table matched case-insensitively against the last user message
//!
//! Anything else gets a fixed placeholder reply. No network I/O is performed.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, LlmStream};
use crate::agents::domain::{Message, Role, TokenUsage, ToolCall};
use crate::agents::error::{LlmError, LlmResult, ProviderError};

const PROVIDER: &str = "mock";

/// Reply used when neither the script nor the table has an answer
pub const PLACEHOLDER_RESPONSE: &str = "This is a mock response.";

/// A canned provider reply
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    content: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<TokenUsage>,
    failure: Option<String>,
}

impl MockResponse {
    /// A plain text reply
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// A reply requesting a single tool call
    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::default().with_tool_call(name, arguments)
    }

    /// A reply that fails with an API error carrying `message`
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Add another tool call with a generated id
    pub fn with_tool_call(self, name: impl Into<String>, arguments: Value) -> Self {
        self.with_call(ToolCall::new(ToolCall::generate_id(), name, arguments))
    }

    /// Add a fully specified tool call
    pub fn with_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Report this usage for the reply instead of the provider default
    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some(TokenUsage::new(input_tokens, output_tokens));
        self
    }
}

/// Mock LLM provider for tests and offline runs
pub struct MockProvider {
    model: String,
    table: Vec<(String, MockResponse)>,
    script: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
    default_usage: TokenUsage,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: "mock".to_string(),
            table: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_usage: TokenUsage::default(),
        }
    }

    /// Set the reported model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Answer any last user message containing `pattern` with `response`.
    ///
    /// Earlier entries win when several patterns match.
    pub fn with_response(mut self, pattern: impl Into<String>, response: MockResponse) -> Self {
        self.table.push((pattern.into().to_lowercase(), response));
        self
    }

    /// Queue a scripted reply
    pub fn with_script(self, response: MockResponse) -> Self {
        self.push_script(response);
        self
    }

    /// Usage reported by replies that do not set their own
    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.default_usage = TokenUsage::new(input_tokens, output_tokens);
        self
    }

    /// Queue a scripted reply on a shared provider
    pub fn push_script(&self, response: MockResponse) {
        lock(&self.script).push_back(response);
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn respond(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        let scripted = lock(&self.script).pop_front();
        let response = scripted.unwrap_or_else(|| self.lookup(&request.messages));
        lock(&self.requests).push(request);

        if let Some(message) = response.failure {
            return Err(ProviderError::new(
                PROVIDER,
                LlmError::Api {
                    status: 500,
                    message,
                },
            ));
        }

        let finish_reason = if response.tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        };

        Ok(CompletionResponse {
            message: Message::assistant_with_tools(response.content, response.tool_calls),
            finish_reason,
            usage: response.usage.unwrap_or(self.default_usage),
        })
    }

    fn lookup(&self, messages: &[Message]) -> MockResponse {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        self.table
            .iter()
            .find(|(pattern, _)| last_user.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| MockResponse::text(PLACEHOLDER_RESPONSE))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> LlmResult<CompletionResponse> {
        self.respond(request)
    }

    fn complete_stream(&self, request: CompletionRequest) -> LlmStream {
        match self.respond(request) {
            Ok(response) => LlmStream::from_response(response),
            Err(e) => LlmStream::from_error(e),
        }
    }
}
