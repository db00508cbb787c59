pub mod approval;
pub mod builtins;

use std::future::Future;
use std::pin::Pin;

use crate::agent::events::Emitter;
use crate::error::Error;
use crate::llm::types::ToolDefinition;

/// Output of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Per-invocation context handed to a tool: the id of the call being
/// serviced and the emit handle for this run's event stream. Tools do not
/// retain the context across calls.
#[derive(Clone)]
pub struct ToolContext {
    pub tool_call_id: String,
    pub emitter: Emitter,
}

impl ToolContext {
    pub fn new(tool_call_id: impl Into<String>, emitter: Emitter) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            emitter,
        }
    }

    /// A context for invoking a tool outside a run (tests, scripts).
    pub fn detached() -> Self {
        Self {
            tool_call_id: String::new(),
            emitter: Emitter::null(),
        }
    }
}

/// Trait for tools the agent can invoke.
///
/// Uses `Pin<Box<dyn Future>>` return type for dyn-compatibility, allowing
/// tools to be stored as `Arc<dyn Tool>`.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>>;
}

/// Check a JSON value against the subset of JSON schema the tool
/// definitions use: top-level `type: object` and `required` keys.
pub fn validate_tool_input(schema: &serde_json::Value, input: &serde_json::Value) -> Result<(), String> {
    if schema.get("type").and_then(|t| t.as_str()) == Some("object") && !input.is_object() {
        return Err("Error: tool input must be a JSON object".to_string());
    }
    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required {
            let Some(key) = key.as_str() else { continue };
            if input.get(key).is_none() {
                return Err(format!("Error: missing required parameter '{key}'"));
            }
        }
    }
    Ok(())
}
