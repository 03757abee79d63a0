//! Agent orchestrator: the bounded model / tool-call loop
//!
//! One `chat` call runs:
//! 1. compose the system prompt, prior history and the user message
//! 2. send them to the provider together with the tool catalog snapshot
//! 3. stop if the reply requests no tools
//! 4. otherwise execute the requested tools, append their results and go to 2
//!
//! After `max_iterations` provider round-trips without a final answer the
//! call fails with [`AgentError::MaxIterations`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

use crate::agents::config::{default_max_iterations, AgentConfig, ModelConfig};
use crate::agents::domain::{
    ChatChunk, ChatOptions, ChatResult, ChatStream, ChatStreamSender, Message, MessageMetadata,
    TokenUsage, ToolCall, ToolResult, ToolSchema, Transcript,
};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderRegistry,
    ToolCallAccumulator,
};
use crate::agents::memory::{create_memory, Memory};
use crate::agents::prompt::compose_system_prompt;
use crate::agents::tools::{ToolCatalog, ToolDefinition, ToolExecutor};

/// Callback invoked once per executed tool call
pub type ToolObserver = Arc<dyn Fn(&ToolCall, &ToolResult) + Send + Sync>;

const DEFAULT_RECENT_LIMIT: usize = 20;
const DEFAULT_RECALL_LIMIT: usize = 3;

/// Drives conversations for one agent.
///
/// Cheap to clone; clones share the provider, tool catalog and memory.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    system_prompt: String,
    model: ModelConfig,
    max_iterations: u32,
    executor: ToolExecutor,
    tools: RwLock<Arc<ToolCatalog>>,
    memory: Option<Arc<dyn Memory>>,
    recent_limit: usize,
    recall_limit: usize,
    registry: ProviderRegistry,
    provider: OnceCell<Arc<dyn LlmProvider>>,
    observer: Option<ToolObserver>,
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    id: String,
    system_prompt: String,
    model: ModelConfig,
    max_iterations: u32,
    executor: ToolExecutor,
    tools: ToolCatalog,
    memory: Option<Arc<dyn Memory>>,
    recent_limit: usize,
    recall_limit: usize,
    registry: Option<ProviderRegistry>,
    provider: Option<Arc<dyn LlmProvider>>,
    observer: Option<ToolObserver>,
}

impl OrchestratorBuilder {
    pub fn new(model: ModelConfig) -> Self {
        Self {
            id: "agent".to_string(),
            system_prompt: String::new(),
            model,
            max_iterations: default_max_iterations(),
            executor: ToolExecutor::default(),
            tools: ToolCatalog::new(),
            memory: None,
            recent_limit: DEFAULT_RECENT_LIMIT,
            recall_limit: DEFAULT_RECALL_LIMIT,
            registry: None,
            provider: None,
            observer: None,
        }
    }

    /// Identifier used in logs
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// System prompt template
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools = self.tools.with_tool(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        for tool in tools {
            self.tools = self.tools.with_tool(tool);
        }
        self
    }

    pub fn catalog(mut self, catalog: ToolCatalog) -> Self {
        self.tools = catalog;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// How many recent memory messages are replayed as history
    pub fn recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// How many similar memory messages are recalled into the context block
    pub fn recall_limit(mut self, limit: usize) -> Self {
        self.recall_limit = limit;
        self
    }

    /// Resolve the provider through a shared registry
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use this provider instead of resolving one from the model config
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ToolCall, &ToolResult) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            inner: Arc::new(Inner {
                id: self.id,
                system_prompt: self.system_prompt,
                model: self.model,
                max_iterations: self.max_iterations,
                executor: self.executor,
                tools: RwLock::new(Arc::new(self.tools)),
                memory: self.memory,
                recent_limit: self.recent_limit,
                recall_limit: self.recall_limit,
                registry: self.registry.unwrap_or_default(),
                provider: OnceCell::new_with(self.provider),
                observer: self.observer,
            }),
        }
    }
}

impl Orchestrator {
    pub fn builder(model: ModelConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(model)
    }

    /// Build an orchestrator for a configured agent.
    ///
    /// `catalog` is narrowed to the tools the agent names. No network I/O
    /// happens until the first chat.
    pub fn from_config(
        config: &AgentConfig,
        catalog: &ToolCatalog,
        executor: ToolExecutor,
        registry: ProviderRegistry,
    ) -> AgentResult<Self> {
        let mut builder = Self::builder(config.model.clone())
            .id(&config.id)
            .system_prompt(&config.system_prompt)
            .max_iterations(config.max_iterations)
            .executor(executor)
            .catalog(catalog.select(&config.tools))
            .recent_limit(config.memory.recent_limit)
            .recall_limit(config.memory.recall_limit)
            .registry(registry);

        if let Some(memory) = create_memory(&config.memory)? {
            builder = builder.memory(memory);
        }

        Ok(builder.build())
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.inner.model
    }

    pub fn max_iterations(&self) -> u32 {
        self.inner.max_iterations
    }

    pub fn memory(&self) -> Option<&Arc<dyn Memory>> {
        self.inner.memory.as_ref()
    }

    /// Add or replace a tool; affects calls started afterwards
    pub async fn add_tool(&self, tool: ToolDefinition) {
        let mut tools = self.inner.tools.write().await;
        *tools = Arc::new(tools.with_tool(tool));
    }

    /// Remove a tool; returns whether it was present
    pub async fn remove_tool(&self, name: &str) -> bool {
        let mut tools = self.inner.tools.write().await;
        if !tools.contains(name) {
            return false;
        }
        *tools = Arc::new(tools.without_tool(name));
        true
    }

    /// Schemas of the currently registered tools
    pub async fn tools(&self) -> Vec<ToolSchema> {
        self.inner.tools.read().await.schemas()
    }

    /// Snapshot of the current tool catalog
    pub async fn tool_catalog(&self) -> Arc<ToolCatalog> {
        self.inner.tools.read().await.clone()
    }

    /// The provider, created through the registry on first use
    pub async fn provider(&self) -> AgentResult<Arc<dyn LlmProvider>> {
        let provider = self
            .inner
            .provider
            .get_or_try_init(|| async {
                self.inner
                    .registry
                    .get_or_create(&self.inner.model)
                    .await
                    .map_err(AgentError::from)
            })
            .await?;
        Ok(provider.clone())
    }

    /// Run one conversation turn to completion
    pub async fn chat(&self, input: &str, options: ChatOptions) -> AgentResult<ChatResult> {
        self.run(input, options, None).await
    }

    /// Run one conversation turn, streaming text, tool activity and the
    /// final result as they happen
    pub fn chat_stream(&self, input: &str, options: ChatOptions) -> ChatStream {
        let (sender, stream) = ChatStream::channel(64);
        let this = self.clone();
        let input = input.to_string();

        tokio::spawn(async move {
            match this.run(&input, options, Some(&sender)).await {
                Ok(result) => {
                    sender.send(ChatChunk::Complete { result }).await;
                }
                Err(e) => {
                    sender.send_error(e).await;
                }
            }
        });

        stream
    }

    async fn run(
        &self,
        input: &str,
        options: ChatOptions,
        sender: Option<&ChatStreamSender>,
    ) -> AgentResult<ChatResult> {
        let inner = &self.inner;
        let conversation_id = options
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let catalog = self.tool_catalog().await;
        let provider = self.provider().await?;
        let mut transcript = self.compose(input, &options).await?;

        let tools = if catalog.is_empty() {
            None
        } else {
            Some(catalog.schemas())
        };

        let mut usage = TokenUsage::default();
        let mut tool_results: Vec<ToolResult> = Vec::new();

        for iteration in 1..=inner.max_iterations {
            tracing::debug!(
                agent = %inner.id,
                conversation_id = %conversation_id,
                iteration,
                messages = transcript.len(),
                "Requesting completion"
            );

            let request = CompletionRequest {
                messages: transcript.snapshot(),
                temperature: options.temperature.or(inner.model.temperature),
                max_tokens: options.max_tokens.or(inner.model.max_tokens),
                top_p: inner.model.top_p,
                tools: tools.clone(),
                stream: sender.is_some(),
                ..Default::default()
            };

            let started = Instant::now();
            let response = match sender {
                Some(sender) => stream_turn(provider.as_ref(), request, sender).await?,
                None => provider.complete(request).await?,
            };
            usage.accumulate(&response.usage);

            let message = response.message.with_metadata(MessageMetadata {
                timestamp: Some(Utc::now()),
                model: Some(provider.model().to_string()),
                input_tokens: Some(response.usage.input_tokens),
                output_tokens: Some(response.usage.output_tokens),
                latency_ms: Some(started.elapsed().as_millis() as u64),
            });

            if !message.has_tool_calls() {
                if let Some(memory) = &inner.memory {
                    memory.add(Message::user(input)).await?;
                    memory.add(message.clone()).await?;
                }

                tracing::info!(
                    agent = %inner.id,
                    conversation_id = %conversation_id,
                    iterations = iteration,
                    tool_calls = tool_results.len(),
                    total_tokens = usage.total_tokens,
                    "Chat completed"
                );

                return Ok(ChatResult {
                    message,
                    tool_results,
                    conversation_id,
                    usage,
                    iterations: iteration,
                });
            }

            let calls = message.requested_tools().to_vec();
            transcript.append(message);

            if let Some(sender) = sender {
                for call in &calls {
                    sender.send(ChatChunk::ToolCall { call: call.clone() }).await;
                }
            }

            tracing::info!(
                agent = %inner.id,
                conversation_id = %conversation_id,
                iteration,
                tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "Executing tool calls"
            );

            let results = inner.executor.execute_all(&catalog, &calls).await;

            for (call, result) in calls.iter().zip(&results) {
                self.notify(call, result);
                if let Some(sender) = sender {
                    sender
                        .send(ChatChunk::ToolResult {
                            result: result.clone(),
                        })
                        .await;
                }
                transcript.append(Message::tool_result(result));
            }
            tool_results.extend(results);
        }

        tracing::warn!(
            agent = %inner.id,
            conversation_id = %conversation_id,
            max_iterations = inner.max_iterations,
            "Max iterations reached without a final answer"
        );
        Err(AgentError::MaxIterations(inner.max_iterations))
    }

    /// Initial transcript: system prompt, memory history, caller history, user input
    async fn compose(&self, input: &str, options: &ChatOptions) -> AgentResult<Transcript> {
        let inner = &self.inner;
        let mut history = Vec::new();
        let mut recalled = Vec::new();

        if let Some(memory) = &inner.memory {
            history = memory.get(Some(inner.recent_limit)).await?;
            if inner.recall_limit > 0 {
                recalled = memory
                    .search(input, inner.recall_limit)
                    .await?
                    .into_iter()
                    .filter(|m| !history.contains(m))
                    .collect();
            }
        }

        let system = compose_system_prompt(&inner.system_prompt, &options.context, &recalled);

        let mut transcript = Transcript::new();
        if !system.is_empty() {
            transcript.append(Message::system(system));
        }
        transcript.extend(history);
        transcript.extend(options.history.iter().cloned());
        transcript.append(Message::user(input));
        Ok(transcript)
    }

    fn notify(&self, call: &ToolCall, result: &ToolResult) {
        let Some(observer) = &self.inner.observer else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| observer(call, result))).is_err() {
            tracing::warn!(tool = %call.name, call_id = %call.id, "Tool observer panicked");
        }
    }
}

/// One streamed provider round-trip, forwarding text as it arrives
async fn stream_turn(
    provider: &dyn LlmProvider,
    request: CompletionRequest,
    sender: &ChatStreamSender,
) -> AgentResult<CompletionResponse> {
    let mut stream = provider.complete_stream(request);
    let mut content = String::new();
    let mut tool_accumulator = ToolCallAccumulator::new();
    let mut finish_reason = None;
    let mut usage = TokenUsage::default();

    while let Some(item) = stream.next().await {
        let chunk = item?;

        if !chunk.content.is_empty() {
            content.push_str(&chunk.content);
            if !sender.send(ChatChunk::text(&chunk.content)).await {
                return Err(AgentError::Internal("chat stream receiver dropped".to_string()));
            }
        }

        for delta in &chunk.tool_calls {
            tool_accumulator.apply_delta(delta);
        }

        if let Some(reason) = chunk.finish_reason {
            finish_reason = Some(reason);
        }
        if let Some(u) = chunk.usage {
            usage = u;
        }
    }

    let tool_calls = tool_accumulator.build();
    let finish_reason = finish_reason.unwrap_or(if tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolCalls
    });

    Ok(CompletionResponse {
        message: Message::assistant_with_tools(content, tool_calls),
        finish_reason,
        usage,
    })
}
