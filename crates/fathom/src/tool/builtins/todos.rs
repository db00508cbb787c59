use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::state::Todo;
use crate::tool::{Tool, ToolContext, ToolOutput};

pub struct WriteTodosTool {
    backend: Arc<dyn Backend>,
}

impl WriteTodosTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for WriteTodosTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_todos".into(),
            description: "Replace the todo list, or merge entries by id when merge is set. Use \
                          this to plan multi-step work and track progress."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {"type": "string"},
                                "content": {"type": "string"},
                                "status": {
                                    "type": "string",
                                    "enum": ["pending", "in_progress", "completed"]
                                }
                            },
                            "required": ["id", "content", "status"]
                        },
                        "description": "The todo entries"
                    },
                    "merge": {
                        "type": "boolean",
                        "description": "Merge by id into the existing list instead of replacing"
                    }
                },
                "required": ["todos"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let raw = input
                .get("todos")
                .cloned()
                .ok_or_else(|| Error::Agent("todos is required".into()))?;

            let incoming: Vec<Todo> = match serde_json::from_value(raw) {
                Ok(todos) => todos,
                Err(e) => return Ok(ToolOutput::error(format!("Error: invalid todos: {e}"))),
            };

            let merge = input
                .get("merge")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            let todos = if merge {
                let mut merged = self.backend.get_todos().await;
                for todo in incoming {
                    match merged.iter_mut().find(|t| t.id == todo.id) {
                        Some(existing) => *existing = todo,
                        None => merged.push(todo),
                    }
                }
                merged
            } else {
                incoming
            };

            self.backend.set_todos(todos.clone()).await;
            let count = todos.len();
            ctx.emitter.emit(AgentEvent::TodosChanged { todos });

            Ok(ToolOutput::success(format!(
                "Todo list updated ({count} items)"
            )))
        })
    }
}
