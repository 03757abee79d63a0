//! Domain types for the agent orchestration core
//!
//! Messages, tool calls and results, chat results and streaming chunks.

mod agent;
mod message;
mod response;
mod tool_call;

pub use agent::*;
pub use message::*;
pub use response::*;
pub use tool_call::*;
