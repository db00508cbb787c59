use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};

/// One web search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Capability for web search. Backed by whatever search API the caller
/// wires in; the harness only consumes this interface.
pub trait WebSearchProvider: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>, Error>> + Send + 'a>>;
}

pub struct WebSearchTool {
    provider: Arc<dyn WebSearchProvider>,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn WebSearchProvider>) -> Self {
        Self { provider }
    }
}

impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web. Returns result titles, URLs, and snippets.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let query = input
                .get("query")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("query is required".into()))?;

            ctx.emitter.emit(AgentEvent::WebSearchStart {
                query: query.into(),
            });

            let results = match self.provider.search(query).await {
                Ok(results) => results,
                Err(e) => {
                    ctx.emitter.emit(AgentEvent::WebSearchFinish {
                        query: query.into(),
                        result_count: 0,
                    });
                    return Ok(ToolOutput::error(format!("Error: search failed: {e}")));
                }
            };

            ctx.emitter.emit(AgentEvent::WebSearchFinish {
                query: query.into(),
                result_count: results.len(),
            });

            if results.is_empty() {
                return Ok(ToolOutput::success("No results found."));
            }
            let formatted = results
                .iter()
                .enumerate()
                .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet))
                .collect::<Vec<_>>()
                .join("\n\n");
            Ok(ToolOutput::success(formatted))
        })
    }
}
