use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

const MAX_RESULTS: usize = 100;

pub struct GlobTool {
    backend: Arc<dyn Backend>,
}

impl GlobTool {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Tool for GlobTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "glob".into(),
            description: "Find files matching a glob pattern. ** crosses directories, * stays \
                          within one segment."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern to match (e.g. \"**/*.rs\")"
                    },
                    "path": {
                        "type": "string",
                        "description": "Base directory to search in (default /)"
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

            let entries = self.backend.glob_info(pattern, path).await;
            ctx.emitter.emit(AgentEvent::Glob {
                pattern: pattern.into(),
            });

            if entries.is_empty() {
                return Ok(ToolOutput::success("No files matched the pattern."));
            }
            let shown = entries.len().min(MAX_RESULTS);
            let mut listing = entries[..shown]
                .iter()
                .map(|e| e.path.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            if entries.len() > MAX_RESULTS {
                listing.push_str(&format!("\n\n(Results limited to {MAX_RESULTS} files)"));
            }
            Ok(ToolOutput::success(listing))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::state::StateBackend;

    #[tokio::test]
    async fn glob_finds_files() {
        let backend = Arc::new(StateBackend::new());
        backend.write("/a.rs", "").await.unwrap();
        backend.write("/src/b.rs", "").await.unwrap();
        backend.write("/c.txt", "").await.unwrap();

        let tool = GlobTool::new(backend);
        let out = tool
            .execute(json!({"pattern": "**/*.rs"}), ToolContext::detached())
            .await
            .unwrap();
        assert!(out.content.contains("/a.rs"));
        assert!(out.content.contains("/src/b.rs"));
        assert!(!out.content.contains("/c.txt"));
    }

    #[tokio::test]
    async fn glob_no_matches() {
        let backend = Arc::new(StateBackend::new());
        backend.write("/a.txt", "").await.unwrap();

        let tool = GlobTool::new(backend);
        let out = tool
            .execute(json!({"pattern": "*.xyz"}), ToolContext::detached())
            .await
            .unwrap();
        assert!(out.content.contains("No files matched"));
    }
}
