// --- Core modules ---
pub mod agent;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod llm;
pub mod state;
pub mod tool;
pub(crate) mod util;

// --- Agent re-exports ---
pub use agent::events::{AgentEvent, Emitter, EventStream};
pub use agent::{AgentOutput, DeepAgent, DeepAgentBuilder, RunInput, SubAgentConfig};

// --- Backend re-exports ---
pub use backend::composite::CompositeBackend;
pub use backend::disk::DiskBackend;
pub use backend::kv::{InMemoryKvStore, KvBackend, KvStore};
pub use backend::state::StateBackend;
pub use backend::{Backend, EntryInfo, EntryKind, GrepMatch};

// --- Checkpoint re-exports ---
pub use checkpoint::file::FileCheckpointer;
pub use checkpoint::in_memory::InMemoryCheckpointer;
pub use checkpoint::kv::KvCheckpointer;
pub use checkpoint::{Checkpoint, Checkpointer};

// --- Config re-exports ---
pub use config::LoopOptions;

// --- Error re-exports ---
pub use error::Error;

// --- LLM re-exports ---
pub use llm::retry::{RetryConfig, RetryingProvider};
pub use llm::types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, Role, StopReason, TokenUsage,
    ToolCall, ToolDefinition, ToolResult,
};
pub use llm::{BoxedProvider, LlmProvider, OnText};

// --- State re-exports ---
pub use state::{AgentState, FileData, Todo, TodoStatus};

// --- Tool re-exports ---
pub use tool::approval::{
    ApprovalGate, ApprovalRequest, DENIAL_MESSAGE, InterruptPolicy, OnApproval,
};
pub use tool::builtins::{
    EditFileTool, ExecResult, ExecuteTool, FetchUrlTool, GlobTool, GrepTool, HttpRequestTool,
    LsTool, ProcessSandbox, ReadFileTool, Sandbox, SearchResult, TaskTool, WebSearchProvider,
    WebSearchTool, WriteFileTool, WriteTodosTool, builtin_tools,
};
pub use tool::{Tool, ToolContext, ToolOutput, validate_tool_input};
