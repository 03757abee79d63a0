use clap::Parser;
use conductor::agents::{AgentHandler, ChatChunk, ChatOptions};
use conductor::cli::{Cli, Commands};
use conductor::config::Settings;
use conductor::telemetry::init_tracing;
use futures::StreamExt;
use std::io::Write;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(level) = &cli.log_level {
        settings.logging.level = level.clone();
    }

    init_tracing(&settings.logging)?;

    let handler = AgentHandler::from_settings(&settings);
    info!("Loaded {} agents", handler.list_agents().len());

    match cli.command {
        Commands::Chat {
            message,
            agent,
            conversation_id,
            stream,
        } => {
            let mut options = ChatOptions::new();
            if let Some(id) = conversation_id {
                options = options.conversation_id(id);
            }

            if stream {
                let mut chunks = handler.chat_stream(&agent, &message, options).await?;
                let mut stdout = std::io::stdout();
                while let Some(chunk) = chunks.next().await {
                    match chunk? {
                        ChatChunk::Text { content } => {
                            write!(stdout, "{}", content)?;
                            stdout.flush()?;
                        }
                        ChatChunk::ToolCall { call } => {
                            info!(tool = %call.name, "Calling tool");
                        }
                        ChatChunk::ToolResult { result } => {
                            info!(tool = %result.tool_name, ok = result.is_success(), "Tool finished");
                        }
                        ChatChunk::Complete { result } => {
                            writeln!(stdout)?;
                            info!(
                                conversation_id = %result.conversation_id,
                                iterations = result.iterations,
                                total_tokens = result.usage.total_tokens,
                                "Done"
                            );
                        }
                    }
                }
            } else {
                let result = handler.chat(&agent, &message, options).await?;
                println!("{}", result.message.content);
            }
        }
        Commands::Agents => {
            for agent in handler.list_agents() {
                println!("{}\t{}\t{}", agent.id, agent.name, agent.description);
            }
        }
        Commands::Tools { agent } => {
            let tools = match agent {
                Some(id) => handler.agent_tools(&id)?,
                None => handler.all_tools(),
            };
            for tool in tools {
                println!("{}\t{}", tool.name, tool.description);
            }
        }
    }

    Ok(())
}
