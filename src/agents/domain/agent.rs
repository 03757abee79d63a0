//! Agent descriptors

use serde::{Deserialize, Serialize};

use crate::agents::config::AgentConfig;

/// Public information about a configured agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Unique agent id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Tools the agent may call
    #[serde(default)]
    pub tools: Vec<String>,
    /// LLM provider being used
    pub provider: String,
    /// LLM model being used
    pub model: String,
}

impl From<&AgentConfig> for AgentInfo {
    fn from(config: &AgentConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            description: config.description.clone(),
            tools: config.tools.clone(),
            provider: config.model.provider.to_string(),
            model: config.model.model.clone(),
        }
    }
}
