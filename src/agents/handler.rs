//! Agent registry: configured agents and their orchestrators

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::agents::config::{AgentConfig, ModelConfig, ProviderKind};
use crate::agents::domain::{AgentInfo, ChatOptions, ChatResult, ChatStream, ToolSchema};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::llm::ProviderRegistry;
use crate::agents::orchestrator::Orchestrator;
use crate::agents::tools::{builtin_tools, ToolCatalog, ToolDefinition, ToolExecutor};
use crate::config::{Settings, ToolSettings};

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Agents installed when configuration declares none
pub fn default_agents() -> Vec<AgentConfig> {
    let mut assistant = AgentConfig::new(
        "assistant",
        "You are a helpful AI assistant. You are friendly, concise, and accurate.\n\
         You help users with a variety of tasks including answering questions, writing, analysis, and more.\n\
         When you don't know something, you say so honestly.",
        ModelConfig::new(ProviderKind::Anthropic, DEFAULT_MODEL).with_temperature(0.7),
    );
    assistant.name = "General Assistant".to_string();
    assistant.description = "A helpful AI assistant".to_string();
    assistant.tools = vec!["calculator".to_string(), "current_time".to_string()];

    let mut coder = AgentConfig::new(
        "coder",
        "You are an expert software engineer. You write clean, maintainable code.\n\
         You follow best practices and explain your reasoning. You consider edge cases and error handling.",
        ModelConfig::new(ProviderKind::Anthropic, DEFAULT_MODEL).with_temperature(0.2),
    );
    coder.name = "Code Assistant".to_string();
    coder.description = "Specialized in coding tasks".to_string();

    vec![assistant, coder]
}

/// Handler for agent operations.
///
/// One orchestrator is built per agent and reused for every call, so an
/// agent's memory is shared by all of its conversations. `conversation_id`
/// labels results; it does not partition memory. Callers that need
/// isolated histories should use `MemoryBackend::None` and pass history
/// through `ChatOptions`.
pub struct AgentHandler {
    /// Agent configs in declaration order
    agents: Vec<AgentConfig>,
    catalog: ToolCatalog,
    tool_settings: ToolSettings,
    registry: ProviderRegistry,
    /// Orchestrators built so far (agent id -> orchestrator)
    orchestrators: Arc<RwLock<HashMap<String, Orchestrator>>>,
}

impl AgentHandler {
    /// Create a handler for `agents`; the defaults are used when the list is empty
    pub fn new(agents: Vec<AgentConfig>, tool_settings: ToolSettings) -> Self {
        let agents = if agents.is_empty() {
            tracing::info!("No agents configured, installing defaults");
            default_agents()
        } else {
            agents
        };

        Self {
            agents,
            catalog: ToolCatalog::from_tools(builtin_tools()),
            tool_settings,
            registry: ProviderRegistry::new(),
            orchestrators: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.agents.clone(), settings.tools.clone())
    }

    /// Make an extra tool available to agents that name it.
    ///
    /// Orchestrators already built keep their own catalog.
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.catalog = self.catalog.with_tool(tool);
        self
    }

    /// Provider cache shared by every agent
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Public information for every agent
    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.iter().map(AgentInfo::from).collect()
    }

    pub fn get_agent(&self, id: &str) -> AgentResult<&AgentConfig> {
        self.agents
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| AgentError::AgentNotFound(id.to_string()))
    }

    /// Schemas of the tools an agent may call
    pub fn agent_tools(&self, id: &str) -> AgentResult<Vec<ToolSchema>> {
        let config = self.get_agent(id)?;
        Ok(self.catalog.select(&config.tools).schemas())
    }

    /// Schemas of every tool in the catalog
    pub fn all_tools(&self) -> Vec<ToolSchema> {
        self.catalog.schemas()
    }

    /// The agent's orchestrator, built on first use and cached
    pub async fn orchestrator(&self, id: &str) -> AgentResult<Orchestrator> {
        if let Some(orchestrator) = self.orchestrators.read().await.get(id) {
            return Ok(orchestrator.clone());
        }

        let config = self.get_agent(id)?;
        let mut orchestrators = self.orchestrators.write().await;
        if let Some(orchestrator) = orchestrators.get(id) {
            return Ok(orchestrator.clone());
        }

        let orchestrator =
            Orchestrator::from_config(config, &self.catalog, self.executor_for(config), self.registry.clone())?;
        tracing::debug!(agent = %id, tools = ?config.tools, "Built orchestrator");
        orchestrators.insert(id.to_string(), orchestrator.clone());

        Ok(orchestrator)
    }

    /// Chat with an agent
    pub async fn chat(&self, id: &str, input: &str, options: ChatOptions) -> AgentResult<ChatResult> {
        self.orchestrator(id).await?.chat(input, options).await
    }

    /// Chat with an agent, streaming
    pub async fn chat_stream(&self, id: &str, input: &str, options: ChatOptions) -> AgentResult<ChatStream> {
        Ok(self.orchestrator(id).await?.chat_stream(input, options))
    }

    fn executor_for(&self, config: &AgentConfig) -> ToolExecutor {
        ToolExecutor::new()
            .with_default_timeout(Duration::from_millis(self.tool_settings.default_timeout_ms))
            .with_max_concurrent(config.max_concurrent_tools.min(self.tool_settings.max_concurrent))
    }
}
