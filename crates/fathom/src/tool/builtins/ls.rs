use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

pub struct LsTool {
    backend: Arc<dyn Backend>,
}

impl LsTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for LsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "ls".into(),
            description: "List files and directories under a path. Directories end with /."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory to list (default /)"
                    }
                }
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let path = input.get("path").and_then(|v| v.as_str()).unwrap_or("/");

            let entries = self.backend.ls_info(path).await;
            ctx.emitter.emit(AgentEvent::Ls { path: path.into() });

            if entries.is_empty() {
                return Ok(ToolOutput::success(format!("No entries under {path}")));
            }
            let listing = entries
                .iter()
                .map(|e| e.path.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            Ok(ToolOutput::success(listing))
        })
    }
}
