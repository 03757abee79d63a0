//! Configuration types for agents

use serde::{Deserialize, Serialize};

/// Configuration for one agent: system prompt, model and tool selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Unique agent id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// System prompt (may contain `{{variables}}` filled from the chat context)
    pub system_prompt: String,
    /// Model configuration
    pub model: ModelConfig,
    /// Names of the tools this agent may call
    #[serde(default)]
    pub tools: Vec<String>,
    /// Maximum provider round-trips per chat call
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Maximum tool calls executed concurrently within one turn
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl AgentConfig {
    /// Create a config with defaults for everything but the essentials
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>, model: ModelConfig) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            system_prompt: system_prompt.into(),
            model,
            tools: Vec::new(),
            max_iterations: default_max_iterations(),
            max_concurrent_tools: default_max_concurrent_tools(),
            memory: MemoryConfig::default(),
        }
    }
}

pub(crate) fn default_max_iterations() -> u32 {
    10
}

pub(crate) fn default_max_concurrent_tools() -> usize {
    4
}

/// Provider and generation parameters for an agent.
///
/// Immutable once an orchestrator has been built from it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Provider type
    #[serde(default)]
    pub provider: ProviderKind,
    /// Model name/identifier
    pub model: String,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Environment variable containing the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Custom base URL (for self-hosted or proxied endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ModelConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            api_key_env: None,
            base_url: None,
        }
    }

    /// Model config backed by the offline mock provider
    pub fn mock() -> Self {
        Self::new(ProviderKind::Mock, "mock")
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions (and compatible endpoints)
    OpenAI,
    /// Anthropic messages API
    #[default]
    Anthropic,
    /// Deterministic offline provider
    Mock,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAI => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::Mock => write!(f, "mock"),
        }
    }
}

/// Memory configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Backend type
    #[serde(default)]
    pub backend: MemoryBackend,
    /// Maximum number of messages retained by the recency buffer
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Number of recent messages replayed into each chat call
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Number of similar messages recalled into the context block
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
    /// Embedding backend for similarity memory
    #[serde(default)]
    pub embedder: EmbedderConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::None,
            max_messages: default_max_messages(),
            recent_limit: default_recent_limit(),
            recall_limit: default_recall_limit(),
            embedder: EmbedderConfig::default(),
        }
    }
}

fn default_max_messages() -> usize {
    100
}

fn default_recent_limit() -> usize {
    20
}

fn default_recall_limit() -> usize {
    3
}

/// Memory backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    /// No memory; history is supplied by the caller
    #[default]
    None,
    /// Bounded recency buffer
    Buffer,
    /// Vector similarity store
    Similarity,
    /// Buffer for recency, similarity store for recall
    Hybrid,
}

/// Embedding backends
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbedderConfig {
    /// Local feature hashing, no network
    Hashing {
        #[serde(default = "default_dimensions")]
        dimensions: usize,
    },
    /// OpenAI embeddings endpoint
    #[serde(rename = "openai")]
    OpenAI {
        model: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        api_key_env: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
    },
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self::Hashing {
            dimensions: default_dimensions(),
        }
    }
}

fn default_dimensions() -> usize {
    256
}
