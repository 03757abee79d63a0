//! Tool definitions, catalog and execution
//!
//! A [`ToolDefinition`] pairs the schema shown to the model with the
//! handler that runs it. Definitions are shared as `Arc`s inside an
//! immutable [`ToolCatalog`]; adding or removing a tool produces a new
//! catalog so in-flight calls keep the snapshot they started with.

mod builtin;
mod executor;

pub use builtin::{builtin_tools, calculator, current_time, json_parse};
pub use executor::{ToolExecutor, DEFAULT_TOOL_TIMEOUT};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::agents::domain::ToolSchema;
use crate::agents::error::ToolError;

/// Behavior behind a tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with the model-supplied arguments
    async fn call(&self, arguments: Value) -> anyhow::Result<Value>;
}

/// Adapts an async closure into a [`ToolHandler`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
        (self.0)(arguments).await
    }
}

/// Argument check run before the handler
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// A named, invocable capability offered to the model
#[derive(Clone)]
pub struct ToolDefinition {
    /// Unique name within a catalog
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// JSON schema for the arguments
    pub parameters: Value,
    /// Per-tool timeout; the executor default applies when unset
    pub timeout: Option<Duration>,
    handler: Arc<dyn ToolHandler>,
    validator: Option<Validator>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            timeout: None,
            handler,
            validator: None,
        }
    }

    /// Build a definition from an async closure
    ///
    /// ```
    /// use conductor::agents::tools::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let echo = ToolDefinition::from_fn(
    ///     "echo",
    ///     "Return the arguments unchanged",
    ///     json!({ "type": "object" }),
    ///     |args| async move { Ok(args) },
    /// );
    /// assert_eq!(echo.schema().name, "echo");
    /// ```
    pub fn from_fn<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, description, parameters, Arc::new(FnHandler(f)))
    }

    /// Override the executor's default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach an argument validator
    pub fn with_validator<V>(mut self, validator: V) -> Self
    where
        V: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Reject arguments that are not an object holding every field listed
    /// under `required` in the parameter schema
    pub fn require_arguments(self) -> Self {
        let required: Vec<String> = self
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        self.with_validator(move |args| {
            if let Value::String(raw) = args {
                return Err(format!("arguments are not valid JSON: {}", raw));
            }
            let Some(object) = args.as_object() else {
                return Err("arguments must be a JSON object".to_string());
            };
            match required.iter().find(|field| !object.contains_key(*field)) {
                Some(missing) => Err(format!("missing required argument '{}'", missing)),
                None => Ok(()),
            }
        })
    }

    /// The behavior-free view sent to providers
    pub fn schema(&self) -> ToolSchema {
        ToolSchema::new(&self.name, &self.description, self.parameters.clone())
    }

    pub(crate) fn handler(&self) -> Arc<dyn ToolHandler> {
        self.handler.clone()
    }

    pub(crate) fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        match &self.validator {
            Some(validator) => validator(arguments).map_err(|message| ToolError::Validation {
                tool: self.name.clone(),
                message,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("timeout", &self.timeout)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Immutable name-indexed set of tools
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<ToolDefinition>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog; later definitions replace earlier ones of the same name
    pub fn from_tools(tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|t| (t.name.clone(), Arc::new(t)))
                .collect(),
        }
    }

    /// New catalog with `tool` added or replaced
    pub fn with_tool(&self, tool: ToolDefinition) -> Self {
        self.with_shared(Arc::new(tool))
    }

    /// New catalog with an already shared definition added or replaced
    pub fn with_shared(&self, tool: Arc<ToolDefinition>) -> Self {
        let mut tools = self.tools.clone();
        tools.insert(tool.name.clone(), tool);
        Self { tools }
    }

    /// New catalog without `name`
    pub fn without_tool(&self, name: &str) -> Self {
        let mut tools = self.tools.clone();
        tools.remove(name);
        Self { tools }
    }

    /// New catalog holding only the named tools that exist here
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Self {
        Self {
            tools: names
                .iter()
                .filter_map(|n| self.tools.get_key_value(n.as_ref()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ToolDefinition>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Schemas for every tool, in name order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(name: &str) -> ToolDefinition {
        ToolDefinition::from_fn(name, "echo", json!({ "type": "object" }), |args| async move {
            Ok(args)
        })
    }

    #[test]
    fn test_catalog_copy_on_write() {
        let base = ToolCatalog::from_tools(vec![echo("a")]);
        let grown = base.with_tool(echo("b"));
        let shrunk = grown.without_tool("a");

        assert_eq!(base.names(), vec!["a"]);
        assert_eq!(grown.names(), vec!["a", "b"]);
        assert_eq!(shrunk.names(), vec!["b"]);
    }

    #[test]
    fn test_select_skips_unknown_names() {
        let catalog = ToolCatalog::from_tools(vec![echo("a"), echo("b")]);
        let selected = catalog.select(&["b", "missing"]);
        assert_eq!(selected.names(), vec!["b"]);
    }

    #[test]
    fn test_require_arguments_validator() {
        let tool = ToolDefinition::from_fn(
            "needs_x",
            "",
            json!({ "type": "object", "required": ["x"] }),
            |args| async move { Ok(args) },
        )
        .require_arguments();

        assert!(tool.validate(&json!({ "x": 1 })).is_ok());

        let err = tool.validate(&json!({ "y": 1 })).unwrap_err();
        assert!(err.to_string().contains("missing required argument 'x'"));
        assert!(tool.validate(&json!("x")).is_err());
    }

    #[test]
    fn test_require_arguments_reports_malformed_json() {
        let tool = ToolDefinition::from_fn("needs_x", "", json!({ "required": ["x"] }), |args| async move {
            Ok(args)
        })
        .require_arguments();

        let raw = crate::agents::llm::parse_arguments("{\"x\": 1");
        let err = tool.validate(&raw).unwrap_err().to_string();
        assert!(err.contains("not valid JSON"));
        assert!(err.contains("{\"x\": 1"));
    }

    #[tokio::test]
    async fn test_fn_handler_runs_closure() {
        let tool = ToolDefinition::from_fn("double", "", json!({}), |args| async move {
            let n = args["n"].as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        });
        let value = tool.handler().call(json!({ "n": 21 })).await.unwrap();
        assert_eq!(value, json!(42));
    }
}
