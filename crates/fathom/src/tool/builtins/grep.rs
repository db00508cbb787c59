use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

const MAX_MATCHES: usize = 100;

pub struct GrepTool {
    backend: Arc<dyn Backend>,
}

impl GrepTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for GrepTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "grep".into(),
            description: "Search file contents with a regex. Returns matching lines with file \
                          paths and 1-based line numbers."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Regex pattern to search for"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory to search in (default /)"
                    },
                    "include": {
                        "type": "string",
                        "description": "File glob filter (e.g. \"*.rs\")"
                    }
                },
                "required": ["pattern"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let pattern = input
                .get("pattern")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("pattern is required".into()))?;

            let path = input.get("path").and_then(|v| v.as_str()).unwrap_or("/");
            let include = input.get("include").and_then(|v| v.as_str());

            let result = self.backend.grep_raw(pattern, path, include).await;
            ctx.emitter.emit(AgentEvent::Grep {
                pattern: pattern.into(),
            });

            match result {
                Err(msg) => Ok(ToolOutput::error(msg)),
                Ok(matches) if matches.is_empty() => {
                    Ok(ToolOutput::success("No matches found."))
                }
                Ok(matches) => {
                    let total = matches.len();
                    let shown = total.min(MAX_MATCHES);
                    let mut listing = matches[..shown]
                        .iter()
                        .map(|m| format!("{}:{}: {}", m.path, m.line, m.text))
                        .collect::<Vec<_>>()
                        .join("\n");
                    if total > MAX_MATCHES {
                        listing
                            .push_str(&format!("\n\n(showing first {MAX_MATCHES} of {total} matches)"));
                    }
                    Ok(ToolOutput::success(listing))
                }
            }
        })
    }
}
