use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

pub struct WriteFileTool {
    backend: Arc<dyn Backend>,
}

impl WriteFileTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: "Create a file in the virtual filesystem. Writing to an existing path \
                          fails; read the file and use edit_file to modify it."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to create (starts with /)"
                    },
                    "content": {
                        "type": "string",
                        "description": "The full content to write"
                    }
                },
                "required": ["path", "content"]
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

            let content = input
                .get("content")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("content is required".into()))?;

            ctx.emitter
                .emit(AgentEvent::FileWriteStart { path: path.into() });

            match self.backend.write(path, content).await {
                Ok(written) => {
                    ctx.emitter.emit(AgentEvent::FileWritten {
                        path: written.clone(),
                    });
                    Ok(ToolOutput::success(format!(
                        "File written: {written} ({} bytes)",
                        content.len()
                    )))
                }
                Err(e) => Ok(ToolOutput::error(e)),
            }
        })
    }
}
