use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

pub struct EditFileTool {
    backend: Arc<dyn Backend>,
}

impl EditFileTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for EditFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "edit_file".into(),
            description: "Edit a file by literal string replacement. old_string must appear \
                          exactly once unless replace_all is set."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to edit (starts with /)"
                    },
                    "old_string": {
                        "type": "string",
                        "description": "The exact string to find and replace"
                    },
                    "new_string": {
                        "type": "string",
                        "description": "The replacement string"
                    },
                    "replace_all": {
                        "type": "boolean",
                        "description": "Replace every occurrence (default false)"
                    }
                },
                "required": ["path", "old_string", "new_string"]
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

            let old_string = input
                .get("old_string")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("old_string is required".into()))?;

            let new_string = input
                .get("new_string")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("new_string is required".into()))?;

            let replace_all = input
                .get("replace_all")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            if old_string == new_string {
                return Ok(ToolOutput::error(
                    "Error: old_string and new_string are identical. No change needed.",
                ));
            }

            match self
                .backend
                .edit(path, old_string, new_string, replace_all)
                .await
            {
                Ok(occurrences) => {
                    ctx.emitter.emit(AgentEvent::FileEdited {
                        path: path.into(),
                        occurrences,
                    });
                    Ok(ToolOutput::success(format!(
                        "Edited {path}: replaced {occurrences} occurrence(s)"
                    )))
                }
                Err(e) => Ok(ToolOutput::error(e)),
            }
        })
    }
}
