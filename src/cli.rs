use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Conductor - agent orchestration with tool calling and memory
#[derive(Parser, Debug, Clone)]
#[command(name = "conductor", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (defaults to ./conductor.{toml,yaml,json} if present)
    #[arg(short, long, env = "CONDUCTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, overriding the configured level
    #[arg(long, env = "CONDUCTOR_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Send one message to an agent
    Chat {
        /// The user message
        message: String,

        /// Agent to talk to
        #[arg(short, long, default_value = "assistant")]
        agent: String,

        /// Conversation identifier; generated when absent
        #[arg(long)]
        conversation_id: Option<String>,

        /// Print text as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// List configured agents
    Agents,

    /// List available tools
    Tools {
        /// Only the tools this agent may call
        #[arg(short, long)]
        agent: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["conductor", "agents"]);
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
        assert_eq!(cli.command, Commands::Agents);
    }

    #[test]
    fn test_chat_with_args() {
        let cli = Cli::parse_from([
            "conductor",
            "--config",
            "custom.toml",
            "--log-level",
            "debug",
            "chat",
            "What is 2+2?",
            "--agent",
            "coder",
            "--conversation-id",
            "conv-7",
            "--stream",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert_eq!(
            cli.command,
            Commands::Chat {
                message: "What is 2+2?".to_string(),
                agent: "coder".to_string(),
                conversation_id: Some("conv-7".to_string()),
                stream: true,
            }
        );
    }

    #[test]
    fn test_chat_default_agent() {
        let cli = Cli::parse_from(["conductor", "chat", "hi"]);
        match cli.command {
            Commands::Chat { agent, stream, .. } => {
                assert_eq!(agent, "assistant");
                assert!(!stream);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_tools_filter() {
        let cli = Cli::parse_from(["conductor", "tools", "-a", "assistant"]);
        assert_eq!(
            cli.command,
            Commands::Tools {
                agent: Some("assistant".to_string())
            }
        );
        assert!(Cli::try_parse_from(["conductor"]).is_err());
    }
}
