use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

const DEFAULT_LIMIT: usize = 2000;

pub struct ReadFileTool {
    backend: Arc<dyn Backend>,
}

impl ReadFileTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a file from the virtual filesystem. Returns content with line \
                          numbers. Long lines are split into numbered chunks."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to read (starts with /)"
                    },
                    "offset": {
                        "type": "integer",
                        "description": "0-based line number to start reading from"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Number of lines to read (default 2000)"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let path = input
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("path is required".into()))?;

            let offset = input
                .get("offset")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(0);

            let limit = input
                .get("limit")
                .and_then(|v| v.as_u64())
                .map(|v| v as usize)
                .unwrap_or(DEFAULT_LIMIT);

            let rendered = self.backend.read(path, offset, limit).await;
            ctx.emitter.emit(AgentEvent::FileRead { path: path.into() });

            if rendered.starts_with("Error:") {
                Ok(ToolOutput::error(rendered))
            } else {
                Ok(ToolOutput::success(rendered))
            }
        })
    }
}
