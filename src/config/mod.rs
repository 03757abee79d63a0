use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod validator;

use crate::agents::config::AgentConfig;
use crate::agents::tools::DEFAULT_TOOL_TIMEOUT;

/// Config file read when no path is given (extension optional)
pub const DEFAULT_CONFIG_FILE: &str = "conductor";

/// Prefix for environment overrides, e.g. `CONDUCTOR__LOGGING__LEVEL=debug`
pub const ENV_PREFIX: &str = "CONDUCTOR";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Tool execution settings shared by every agent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolSettings {
    /// Timeout for tools that do not set their own
    #[serde(default = "default_tool_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Upper bound on concurrent tool calls per turn, applied on top of each
    /// agent's own limit
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_tool_timeout_ms(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_tool_timeout_ms() -> u64 {
    DEFAULT_TOOL_TIMEOUT.as_millis() as u64
}

fn default_max_concurrent() -> usize {
    crate::agents::config::default_max_concurrent_tools()
}

impl Settings {
    /// Load `conductor.{toml,yaml,json}` from the working directory if present
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::load(None)
    }

    /// Load settings: config file (optional), then `CONDUCTOR__*` environment
    /// overrides, then validation.
    ///
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, anyhow::Error> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let s = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        validator::ConfigValidator::validate(&settings).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })?;

        Ok(settings)
    }
}
