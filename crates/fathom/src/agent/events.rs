use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::{AgentState, Todo};
use crate::util::floor_char_boundary;

/// Maximum byte size for event payload strings (tool output, inputs).
/// Payloads exceeding this are truncated with a suffix noting the cut.
pub(crate) const EVENT_MAX_PAYLOAD_BYTES: usize = 4096;

/// Truncate a string for event payloads. Short strings pass through
/// unchanged; long strings are cut at a UTF-8 char boundary.
pub(crate) fn truncate_for_event(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let cut = floor_char_boundary(text, max_bytes);
    let omitted = text.len() - cut;
    format!("{}[truncated: {omitted} bytes omitted]", &text[..cut])
}

/// Structured events emitted during an agent run.
///
/// This is a closed set: the wire tag (kebab-case `type` field) is the
/// event protocol consumers match on. Events are ephemeral; they are never
/// persisted. For any tool call, `tool-call` precedes `tool-result` for the
/// same id, `approval-requested` (if any) precedes the corresponding
/// `tool-call`, and `checkpoint-saved` for step k precedes any `tool-call`
/// of step k+1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    /// A streamed text delta from the model.
    Text { text: String },
    /// A new step (model call cycle) is starting.
    StepStart { step: u64 },
    /// The model requested a tool invocation.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    /// A tool invocation finished (payload truncated for transport).
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: String,
        is_error: bool,
    },
    /// The todo list was replaced or merged.
    TodosChanged { todos: Vec<Todo> },
    FileWriteStart { path: String },
    FileWritten { path: String },
    FileEdited { path: String, occurrences: usize },
    FileRead { path: String },
    Ls { path: String },
    Glob { pattern: String },
    Grep { pattern: String },
    ExecuteStart { command: String },
    ExecuteFinish { exit_code: i32 },
    WebSearchStart { query: String },
    WebSearchFinish { query: String, result_count: usize },
    HttpRequestStart { url: String },
    HttpRequestFinish { url: String, status: u16 },
    FetchUrlStart { url: String },
    FetchUrlFinish { url: String },
    SubagentStart { name: String, description: String },
    SubagentStep { name: String, step: u64 },
    SubagentFinish { name: String },
    /// A completed text segment (the full text of one model response).
    TextSegment { text: String },
    /// The user message that seeded this run.
    UserMessage { text: String },
    /// Terminal: the run completed.
    Done {
        final_text: String,
        state: AgentState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
    /// Terminal: the run failed.
    Error { message: String },
    ApprovalRequested {
        approval_id: String,
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
    ApprovalResponse { approval_id: String, approved: bool },
    CheckpointSaved { thread_id: String, step: u64 },
    CheckpointLoaded {
        thread_id: String,
        step: u64,
        messages_count: usize,
    },
}

/// Handle the loop and tools use to push events to the single consumer.
///
/// Emission never blocks and never fails loudly: once the consumer drops
/// its [`EventStream`], `emit` returns `false` and the loop treats that as
/// cancellation at its next suspension point.
#[derive(Clone)]
pub struct Emitter {
    tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Emitter {
    pub(crate) fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// An emitter that discards everything. Useful in tests and for
    /// tools executed outside a run.
    pub fn null() -> Self {
        Self { tx: None }
    }

    /// Push an event. Returns `false` when the consumer is gone.
    pub fn emit(&self, event: AgentEvent) -> bool {
        match &self.tx {
            Some(tx) => tx.send(event).is_ok(),
            None => true,
        }
    }

    /// True while the consumer still holds the stream.
    pub fn is_live(&self) -> bool {
        match &self.tx {
            Some(tx) => !tx.is_closed(),
            None => true,
        }
    }
}

/// Single-consumer stream of [`AgentEvent`]s produced by a run.
///
/// Dropping the stream cancels the run: the loop stops issuing further
/// model and tool calls at its next suspension point. In-flight tool
/// executions run to completion and their results are discarded.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<AgentEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<AgentEvent>) -> Self {
        Self { rx }
    }

    /// Next event, or `None` once the run has finished.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }

    /// Drain the stream, collecting every remaining event.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}
