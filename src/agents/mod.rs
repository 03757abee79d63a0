//! Agent orchestration core
//!
//! An agent is a system prompt, a model and a set of tools. A chat call
//! sends the conversation to the model, runs any tools it asks for, feeds
//! the results back and repeats until the model answers or the iteration
//! limit is hit.
//!
//! ## Architecture
//!
//! - `domain/` - Core types (Message, ToolCall, ToolResult, ChatResult, ChatChunk)
//! - `llm/` - Provider clients with streaming, and the provider registry
//! - `tools/` - Tool definitions, the catalog, the executor and built-in tools
//! - `memory/` - Buffer, similarity and hybrid conversation memory
//! - `orchestrator` - The model / tool-call loop
//! - `handler` - Configured agents and their orchestrators

pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod tools;

// Re-export commonly used types
pub use config::*;
pub use domain::*;
pub use error::*;
pub use handler::AgentHandler;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, ToolObserver};
