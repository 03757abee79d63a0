//! Tool execution with timeouts and failure containment

use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde_json::Value;

use super::ToolCatalog;
use crate::agents::config::default_max_concurrent_tools;
use crate::agents::domain::{ToolCall, ToolResult};
use crate::agents::error::ToolError;

/// Timeout applied to tools that do not set their own
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs tool calls against a catalog.
///
/// Never fails: every call produces exactly one [`ToolResult`], and
/// unknown tools, validation failures, handler errors, panics and
/// timeouts all end up in `ToolResult::error`.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    default_timeout: Duration,
    max_concurrent: usize,
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            max_concurrent: default_max_concurrent_tools(),
        }
    }
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Limit on calls running at once; `1` runs them one after another
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Execute a single call
    pub async fn execute(&self, catalog: &ToolCatalog, call: &ToolCall) -> ToolResult {
        let start = Instant::now();
        let outcome = self.run(catalog, call).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                tracing::debug!(tool = %call.name, call_id = %call.id, elapsed_ms, "Tool call succeeded");
                ToolResult::success(&call.id, &call.name, value, elapsed_ms)
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, elapsed_ms, error = %e, "Tool call failed");
                ToolResult::failure(&call.id, &call.name, e.to_string(), elapsed_ms)
            }
        }
    }

    /// Execute every call, at most `max_concurrent` at a time.
    ///
    /// Results come back in the order of `calls`.
    pub async fn execute_all(&self, catalog: &ToolCatalog, calls: &[ToolCall]) -> Vec<ToolResult> {
        // Collected first; a mapping closure here fails the Send bound under tokio::spawn.
        let pending: Vec<_> = calls.iter().map(|call| self.execute(catalog, call)).collect();
        stream::iter(pending)
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    async fn run(&self, catalog: &ToolCatalog, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = catalog
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        tool.validate(&call.arguments)?;

        let timeout = tool.timeout.unwrap_or(self.default_timeout);
        let handler = tool.handler();
        let arguments = call.arguments.clone();

        // Dropping the JoinHandle on timeout detaches the task without aborting it.
        let task = tokio::spawn(async move { handler.call(arguments).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(ToolError::Execution(format!("{:#}", e))),
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(ToolError::Panicked(call.name.clone()))
            }
            Ok(Err(join_error)) => Err(ToolError::Execution(join_error.to_string())),
            Err(_elapsed) => Err(ToolError::Timeout {
                tool: call.name.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
