use std::collections::HashSet;
use thiserror::Error;

use crate::agents::config::AgentConfig;
use crate::agents::tools::builtin_tools;
use crate::config::{Settings, ToolSettings};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cross-reference error: {0}")]
    CrossReference(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_tools(&settings.tools) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_agents(&settings.agents) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_cross_references(settings) {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_tools(tools: &ToolSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if tools.default_timeout_ms == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "tools.default_timeout_ms".to_string(),
                reason: "Timeout must be greater than 0".to_string(),
            });
        }

        if tools.max_concurrent == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "tools.max_concurrent".to_string(),
                reason: "Must allow at least one tool call".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_agents(agents: &[AgentConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen_ids = HashSet::new();

        for agent in agents {
            if agent.id.is_empty() {
                errors.push(ValidationError::MissingField("agents.id".to_string()));
            } else if !seen_ids.insert(&agent.id) {
                errors.push(ValidationError::Duplicate(format!("agent id '{}'", agent.id)));
            }

            let field = |name: &str| format!("agents.{}.{}", agent.id, name);

            if agent.model.model.trim().is_empty() {
                errors.push(ValidationError::MissingField(field("model.model")));
            }

            if agent.max_iterations == 0 {
                errors.push(ValidationError::InvalidValue {
                    field: field("max_iterations"),
                    reason: "Must be at least 1".to_string(),
                });
            }

            if let Some(temperature) = agent.model.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    errors.push(ValidationError::InvalidValue {
                        field: field("model.temperature"),
                        reason: format!("{} is outside [0, 2]", temperature),
                    });
                }
            }

            if let Some(top_p) = agent.model.top_p {
                if !(0.0..=1.0).contains(&top_p) {
                    errors.push(ValidationError::InvalidValue {
                        field: field("model.top_p"),
                        reason: format!("{} is outside [0, 1]", top_p),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_cross_references(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let known: HashSet<String> = builtin_tools().into_iter().map(|t| t.name).collect();

        for agent in &settings.agents {
            for tool in &agent.tools {
                if !known.contains(tool) {
                    errors.push(ValidationError::CrossReference(format!(
                        "Agent '{}' references unknown tool '{}'",
                        agent.id, tool
                    )));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
