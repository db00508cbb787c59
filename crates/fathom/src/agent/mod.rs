pub mod events;
pub(crate) mod eviction;
pub(crate) mod summarize;
pub(crate) mod token_estimator;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::backend::state::StateBackend;
use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::config::{DEFAULT_SUBAGENT_MAX_STEPS, LoopOptions};
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::{
    CompletionRequest, Message, Role, StopReason, ToolDefinition, ToolResult,
};
use crate::tool::approval::{ApprovalRequest, InterruptPolicy, OnApproval, wrap_tools};
use crate::tool::builtins::{
    ExecuteTool, FetchUrlTool, HttpRequestTool, Sandbox, TaskTool, WebSearchProvider,
    WebSearchTool, builtin_tools,
};
use crate::tool::{Tool, ToolContext, ToolOutput, validate_tool_input};

use self::events::{AgentEvent, EVENT_MAX_PAYLOAD_BYTES, Emitter, EventStream, truncate_for_event};
use self::eviction::maybe_evict;
use self::summarize::{MAX_TOKEN_THRESHOLD, summarize_if_needed};

/// Result of draining a run to completion.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub final_text: String,
    pub state: crate::state::AgentState,
    /// Number of model-call cycles this invocation performed.
    pub steps: u64,
    /// Structured output parsed against the configured schema, if any.
    pub output: Option<serde_json::Value>,
}

/// Configuration for a named sub-agent the `task` tool can spawn.
///
/// A sub-agent runs an isolated inner loop: it shares the parent's backend
/// but not its message buffer, and may carry its own approval config.
#[derive(Clone)]
pub struct SubAgentConfig {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub tools: Vec<Arc<dyn Tool>>,
    pub interrupt_on: HashMap<String, InterruptPolicy>,
    pub max_steps: u64,
}

impl SubAgentConfig {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            interrupt_on: HashMap::new(),
            max_steps: DEFAULT_SUBAGENT_MAX_STEPS,
        }
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn interrupt_on(mut self, tool_name: impl Into<String>, policy: InterruptPolicy) -> Self {
        self.interrupt_on.insert(tool_name.into(), policy);
        self
    }

    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl std::fmt::Debug for SubAgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubAgentConfig")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tools_count", &self.tools.len())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Input for a single run: a fresh user prompt, or a caller-assembled
/// message list appended to any resumed history.
pub enum RunInput {
    Prompt(String),
    Messages(Vec<Message>),
}

impl From<&str> for RunInput {
    fn from(text: &str) -> Self {
        Self::Prompt(text.to_string())
    }
}

impl From<String> for RunInput {
    fn from(text: String) -> Self {
        Self::Prompt(text)
    }
}

impl From<Vec<Message>> for RunInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::Messages(messages)
    }
}

struct AgentInner<P> {
    provider: Arc<P>,
    system_prompt: String,
    tools: HashMap<String, Arc<dyn Tool>>,
    tool_defs: Vec<ToolDefinition>,
    backend: Arc<dyn Backend>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    thread_id: Option<String>,
    options: LoopOptions,
    max_tokens: u32,
    output_schema: Option<serde_json::Value>,
}

/// The tool-loop driver: orchestrates streamed model calls, sequential
/// gated tool execution, eviction, summarization, per-step checkpointing,
/// and event emission.
pub struct DeepAgent<P: LlmProvider> {
    inner: Arc<AgentInner<P>>,
}

impl<P: LlmProvider + 'static> DeepAgent<P> {
    pub fn builder(provider: Arc<P>) -> DeepAgentBuilder<P> {
        DeepAgentBuilder {
            provider,
            system_prompt: String::new(),
            tools: Vec::new(),
            backend: None,
            checkpointer: None,
            thread_id: None,
            interrupt_on: HashMap::new(),
            on_approval: None,
            options: LoopOptions::default(),
            max_tokens: 4096,
            output_schema: None,
            subagents: Vec::new(),
            sandbox: None,
            web_search: None,
            http_tools: false,
        }
    }

    /// Start a run. The returned [`EventStream`] is the single consumer of
    /// this run's events; dropping it cancels the run at the loop's next
    /// suspension point.
    pub fn run(&self, input: impl Into<RunInput>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        let input = input.into();
        tokio::spawn(async move {
            let emitter = Emitter::new(tx);
            if let Err(e) = drive(&inner, input, &emitter).await {
                emitter.emit(AgentEvent::Error {
                    message: e.to_string(),
                });
            }
        });
        EventStream::new(rx)
    }

    /// Run to completion, draining the event stream into an [`AgentOutput`].
    pub async fn execute(&self, input: impl Into<RunInput>) -> Result<AgentOutput, Error> {
        let mut stream = self.run(input);
        let mut steps = 0u64;
        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::StepStart { .. } => steps += 1,
                AgentEvent::Done {
                    final_text,
                    state,
                    output,
                } => {
                    return Ok(AgentOutput {
                        final_text,
                        state,
                        steps,
                        output,
                    });
                }
                AgentEvent::Error { message } => return Err(Error::Agent(message)),
                _ => {}
            }
        }
        Err(Error::Agent(
            "event stream ended without a terminal event".into(),
        ))
    }
}

async fn drive<P: LlmProvider>(
    inner: &AgentInner<P>,
    input: RunInput,
    emitter: &Emitter,
) -> Result<(), Error> {
    let mut messages: Vec<Message> = Vec::new();
    let mut step: u64 = 0;

    if let (Some(store), Some(thread_id)) = (&inner.checkpointer, &inner.thread_id)
        && let Some(checkpoint) = store.load(thread_id).await?
    {
        messages = checkpoint.messages;
        step = checkpoint.step;
        inner.backend.import_state(checkpoint.state).await;
        emitter.emit(AgentEvent::CheckpointLoaded {
            thread_id: thread_id.clone(),
            step,
            messages_count: messages.len(),
        });
    }

    match input {
        RunInput::Prompt(text) => {
            emitter.emit(AgentEvent::UserMessage { text: text.clone() });
            messages.push(Message::user(text));
        }
        RunInput::Messages(list) => messages.extend(list),
    }

    let mut steps_taken: u64 = 0;
    loop {
        if steps_taken >= inner.options.max_steps {
            return Err(Error::MaxStepsExceeded(inner.options.max_steps));
        }
        if !emitter.is_live() {
            debug!("event consumer gone, cancelling run");
            return Ok(());
        }

        messages = summarize_if_needed(
            inner.provider.as_ref(),
            messages,
            inner.options.token_threshold,
            inner.options.keep_messages,
        )
        .await?;

        emitter.emit(AgentEvent::StepStart { step });
        debug!(step, messages = messages.len(), "calling model");

        let request = CompletionRequest {
            system: inner.system_prompt.clone(),
            messages: messages.clone(),
            tools: inner.tool_defs.clone(),
            max_tokens: inner.max_tokens,
        };
        let text_emitter = emitter.clone();
        let on_text = move |delta: &str| {
            text_emitter.emit(AgentEvent::Text {
                text: delta.to_string(),
            });
        };
        let response = inner.provider.stream_complete(request, &on_text).await?;

        let segment = response.text();
        if !segment.is_empty() {
            emitter.emit(AgentEvent::TextSegment {
                text: segment.clone(),
            });
        }
        let tool_calls = response.tool_calls();
        messages.push(Message {
            role: Role::Assistant,
            content: response.content,
        });

        if tool_calls.is_empty() {
            if response.stop_reason == StopReason::MaxTokens {
                return Err(Error::Truncated);
            }
            step += 1;
            save_checkpoint(inner, &messages, step, emitter).await?;
            let output = inner
                .output_schema
                .as_ref()
                .and_then(|schema| parse_structured_output(&segment, schema));
            emitter.emit(AgentEvent::Done {
                final_text: segment,
                state: inner.backend.export_state().await,
                output,
            });
            return Ok(());
        }

        // Tool calls run sequentially on the loop's single thread; the
        // AgentState is only ever mutated here and in the gate path.
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in &tool_calls {
            debug!(tool = %call.name, id = %call.id, "executing tool");
            let output = match inner.tools.get(&call.name) {
                Some(tool) => {
                    let ctx = ToolContext::new(call.id.clone(), emitter.clone());
                    tool.execute(call.input.clone(), ctx)
                        .await
                        .unwrap_or_else(|e| ToolOutput::error(format!("Error: {e}")))
                }
                None => {
                    emitter.emit(AgentEvent::ToolCall {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        input: call.input.clone(),
                    });
                    ToolOutput::error(format!("Error: Tool not found: {}", call.name))
                }
            };
            let content = maybe_evict(
                inner.backend.as_ref(),
                &call.name,
                &call.id,
                output.content,
                inner.options.eviction_limit,
            )
            .await;
            emitter.emit(AgentEvent::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                output: truncate_for_event(&content, EVENT_MAX_PAYLOAD_BYTES),
                is_error: output.is_error,
            });
            results.push(if output.is_error {
                ToolResult::error(call.id.clone(), content)
            } else {
                ToolResult::success(call.id.clone(), content)
            });
        }
        messages.push(Message::tool_results(results));

        step += 1;
        steps_taken += 1;
        save_checkpoint(inner, &messages, step, emitter).await?;
    }
}

async fn save_checkpoint<P: LlmProvider>(
    inner: &AgentInner<P>,
    messages: &[Message],
    step: u64,
    emitter: &Emitter,
) -> Result<(), Error> {
    let (Some(store), Some(thread_id)) = (&inner.checkpointer, &inner.thread_id) else {
        return Ok(());
    };
    let state = inner.backend.export_state().await;
    let checkpoint = Checkpoint::new(thread_id.clone(), step, messages.to_vec(), state);
    store.save(&checkpoint).await?;
    emitter.emit(AgentEvent::CheckpointSaved {
        thread_id: thread_id.clone(),
        step,
    });
    Ok(())
}

/// Parse the final assistant text as JSON and check it against the
/// caller-supplied schema. Failure yields `None`; the text result still
/// stands on its own.
fn parse_structured_output(
    text: &str,
    schema: &serde_json::Value,
) -> Option<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    validate_tool_input(schema, &value).ok()?;
    Some(value)
}

pub struct DeepAgentBuilder<P: LlmProvider> {
    provider: Arc<P>,
    system_prompt: String,
    tools: Vec<Arc<dyn Tool>>,
    backend: Option<Arc<dyn Backend>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    thread_id: Option<String>,
    interrupt_on: HashMap<String, InterruptPolicy>,
    on_approval: Option<Arc<OnApproval>>,
    options: LoopOptions,
    max_tokens: u32,
    output_schema: Option<serde_json::Value>,
    subagents: Vec<SubAgentConfig>,
    sandbox: Option<Arc<dyn Sandbox>>,
    web_search: Option<Arc<dyn WebSearchProvider>>,
    http_tools: bool,
}

impl<P: LlmProvider + 'static> DeepAgentBuilder<P> {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Add a user-supplied tool alongside the built-ins.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Filesystem backend. Defaults to a fresh in-memory [`StateBackend`].
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Persistence adapter. Without one, no thread state is kept.
    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Resume/save key. Meaningful only together with a checkpointer.
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Gate a tool behind approval.
    pub fn interrupt_on(mut self, tool_name: impl Into<String>, policy: InterruptPolicy) -> Self {
        self.interrupt_on.insert(tool_name.into(), policy);
        self
    }

    pub fn interrupts(mut self, interrupt_on: HashMap<String, InterruptPolicy>) -> Self {
        self.interrupt_on.extend(interrupt_on);
        self
    }

    /// Async approval callback. Absent, every gated call is denied.
    pub fn on_approval<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ApprovalRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.on_approval = Some(Arc::new(move |request| Box::pin(callback(request))));
        self
    }

    pub fn max_steps(mut self, max_steps: u64) -> Self {
        self.options.max_steps = max_steps;
        self
    }

    pub fn token_threshold(mut self, threshold: u32) -> Self {
        self.options.token_threshold = threshold;
        self
    }

    pub fn keep_messages(mut self, keep: usize) -> Self {
        self.options.keep_messages = keep;
        self
    }

    pub fn eviction_limit(mut self, limit: u32) -> Self {
        self.options.eviction_limit = limit;
        self
    }

    pub fn options(mut self, options: LoopOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Schema the final assistant message is parsed against; the parsed
    /// value rides the `done` event.
    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Register a named sub-agent; registering any enables the `task` tool.
    pub fn subagent(mut self, config: SubAgentConfig) -> Self {
        self.subagents.push(config);
        self
    }

    /// Enable the `execute` tool over the given sandbox.
    pub fn sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Enable the `web_search` tool over the given provider.
    pub fn web_search(mut self, provider: Arc<dyn WebSearchProvider>) -> Self {
        self.web_search = Some(provider);
        self
    }

    /// Enable the `http_request` and `fetch_url` tools.
    pub fn http_tools(mut self, enabled: bool) -> Self {
        self.http_tools = enabled;
        self
    }

    pub fn build(mut self) -> DeepAgent<P> {
        assert!(self.options.max_steps > 0, "max_steps must be at least 1");
        self.options.token_threshold = self.options.token_threshold.min(MAX_TOKEN_THRESHOLD);

        let backend: Arc<dyn Backend> = self
            .backend
            .unwrap_or_else(|| Arc::new(StateBackend::new()));

        let mut all_tools = builtin_tools(backend.clone());
        if !self.subagents.is_empty() {
            all_tools.push(Arc::new(TaskTool::new(
                self.provider.clone(),
                backend.clone(),
                self.subagents,
                self.on_approval.clone(),
            )));
        }
        if let Some(sandbox) = self.sandbox {
            all_tools.push(Arc::new(ExecuteTool::new(sandbox)));
        }
        if let Some(search) = self.web_search {
            all_tools.push(Arc::new(WebSearchTool::new(search)));
        }
        if self.http_tools {
            all_tools.push(Arc::new(HttpRequestTool::new()));
            all_tools.push(Arc::new(FetchUrlTool::new()));
        }
        all_tools.extend(self.tools);

        let gated = wrap_tools(all_tools, &self.interrupt_on, self.on_approval);

        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::with_capacity(gated.len());
        let mut tool_defs: Vec<ToolDefinition> = Vec::with_capacity(gated.len());
        for tool in gated {
            let def = tool.definition();
            if tools.contains_key(&def.name) {
                warn!(tool = %def.name, "duplicate tool name, keeping first registration");
                continue;
            }
            tool_defs.push(def.clone());
            tools.insert(def.name, tool);
        }

        DeepAgent {
            inner: Arc::new(AgentInner {
                provider: self.provider,
                system_prompt: self.system_prompt,
                tools,
                tool_defs,
                backend,
                checkpointer: self.checkpointer,
                thread_id: self.thread_id,
                options: self.options,
                max_tokens: self.max_tokens,
                output_schema: self.output_schema,
            }),
        }
    }
}
