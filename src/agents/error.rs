//! Error types for the agent orchestration core

use thiserror::Error;

/// Errors that terminate a `chat()` call
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent not found in the registry
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Provider (LLM backend) failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Memory read/write failure
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Max iterations reached without a final answer
    #[error("Max iterations ({0}) reached without completion")]
    MaxIterations(u32),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Uniform error surfaced by every provider client.
///
/// Carries the backend name so callers never have to match on
/// backend-specific failures.
#[derive(Debug, Error)]
#[error("{provider} provider error: {kind}")]
pub struct ProviderError {
    /// Backend name (`openai`, `anthropic`, `mock`)
    pub provider: String,
    /// What went wrong
    pub kind: LlmError,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, kind: LlmError) -> Self {
        Self {
            provider: provider.into(),
            kind,
        }
    }
}

/// Failure kinds reported by provider clients
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Timeout
    #[error("Request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_connect() {
            LlmError::Network(format!("Connection error: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

/// Failures of a single tool invocation.
///
/// These never escape the tool executor; they are rendered into
/// `ToolResult::error` so the model can react to them.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    Validation { tool: String, message: String },

    #[error("{0}")]
    Execution(String),

    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    Timeout { tool: String, timeout_ms: u64 },

    #[error("tool '{0}' panicked")]
    Panicked(String),
}

/// Errors raised by memory backends
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Embedding provider failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Vector index failed
    #[error("Vector index error: {0}")]
    Index(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::Serialization(err.to_string())
    }
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type alias for provider operations
pub type LlmResult<T> = Result<T, ProviderError>;

/// Result type alias for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_carries_backend_name() {
        let err = ProviderError::new(
            "anthropic",
            LlmError::Api {
                status: 529,
                message: "overloaded".to_string(),
            },
        );
        let text = err.to_string();
        assert!(text.starts_with("anthropic provider error"));
        assert!(text.contains("overloaded"));

        let agent_err: AgentError = err.into();
        assert!(matches!(agent_err, AgentError::Provider(ref p) if p.provider == "anthropic"));
    }

    #[test]
    fn test_tool_error_messages() {
        assert_eq!(
            ToolError::UnknownTool("search".to_string()).to_string(),
            "unknown tool: search"
        );
        let timeout = ToolError::Timeout {
            tool: "slow".to_string(),
            timeout_ms: 100,
        };
        assert!(timeout.to_string().contains("timed out"));
    }
}
