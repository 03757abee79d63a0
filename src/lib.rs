//! # Conductor - agent orchestration core
//!
//! Conductor runs LLM agents that call tools. It talks to several model
//! providers behind one trait, executes tool calls concurrently with
//! per-call timeouts, and keeps optional conversation memory.
//!
//! ## Features
//!
//! - **Providers**: OpenAI, Anthropic and a scripted mock, all streaming
//! - **Tools**: JSON-schema tools with validation, timeouts and panic isolation
//! - **Memory**: Recent-message buffer, similarity recall, or both
//! - **Configuration**: TOML/YAML/JSON file plus `CONDUCTOR__*` environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conductor::agents::{AgentHandler, ChatOptions};
//! use conductor::config::Settings;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let handler = AgentHandler::from_settings(&settings);
//!
//!     let result = handler
//!         .chat("assistant", "What is 2 + 2?", ChatOptions::new())
//!         .await?;
//!     println!("{}", result.message.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Agents**: Domain types, providers, tools, memory and the orchestrator
//! - **Config**: Settings loading and validation
//! - **Telemetry**: Tracing subscriber setup
//! - **CLI**: Command-line entry point

pub mod agents;
pub mod cli;
pub mod config;
pub mod telemetry;

pub use agents::{AgentHandler, ChatOptions, ChatResult, Orchestrator};
pub use config::Settings;
