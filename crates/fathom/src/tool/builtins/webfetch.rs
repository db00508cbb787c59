use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};
use crate::util::floor_char_boundary;

const MAX_RESPONSE_BYTES: usize = 5 * 1024 * 1024; // 5 MB
const MAX_OUTPUT_CHARS: usize = 50_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 120;

pub struct FetchUrlTool {
    client: reqwest::Client,
}

impl FetchUrlTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("fathom/0.1")
                .build()
                .expect("failed to build reqwest client"),
        }
    }
}

impl Default for FetchUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for FetchUrlTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_url".into(),
            description: "Fetch the content of a URL via HTTP GET. Max response: 5 MB.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to fetch"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Timeout in seconds (default 30, max 120)"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let url = input
                .get("url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("url is required".into()))?;

            let timeout_secs = input
                .get("timeout")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .min(MAX_TIMEOUT_SECS);

            let url_lower = url.to_ascii_lowercase();
            if !url_lower.starts_with("http://") && !url_lower.starts_with("https://") {
                return Ok(ToolOutput::error(
                    "Error: Only http:// and https:// URLs are supported.",
                ));
            }

            ctx.emitter
                .emit(AgentEvent::FetchUrlStart { url: url.into() });

            let response = match self
                .client
                .get(url)
                .timeout(Duration::from_secs(timeout_secs))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    ctx.emitter
                        .emit(AgentEvent::FetchUrlFinish { url: url.into() });
                    return Ok(ToolOutput::error(format!("Error: fetch failed: {e}")));
                }
            };

            let status = response.status();
            if !status.is_success() {
                ctx.emitter
                    .emit(AgentEvent::FetchUrlFinish { url: url.into() });
                return Ok(ToolOutput::error(format!(
                    "Error: HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                )));
            }

            if let Some(len) = response.content_length()
                && len > MAX_RESPONSE_BYTES as u64
            {
                ctx.emitter
                    .emit(AgentEvent::FetchUrlFinish { url: url.into() });
                return Ok(ToolOutput::error(format!(
                    "Error: Response too large ({len} bytes). Maximum: {MAX_RESPONSE_BYTES} bytes."
                )));
            }

            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    ctx.emitter
                        .emit(AgentEvent::FetchUrlFinish { url: url.into() });
                    return Ok(ToolOutput::error(format!(
                        "Error: failed to read response: {e}"
                    )));
                }
            };
            ctx.emitter
                .emit(AgentEvent::FetchUrlFinish { url: url.into() });

            if bytes.len() > MAX_RESPONSE_BYTES {
                return Ok(ToolOutput::error(format!(
                    "Error: Response too large ({} bytes). Maximum: {MAX_RESPONSE_BYTES} bytes.",
                    bytes.len()
                )));
            }

            let mut text = String::from_utf8_lossy(&bytes).to_string();
            if text.len() > MAX_OUTPUT_CHARS {
                let cut = floor_char_boundary(&text, MAX_OUTPUT_CHARS);
                text.truncate(cut);
                text.push_str("\n[content truncated]");
            }
            Ok(ToolOutput::success(text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_has_correct_name() {
        let tool = FetchUrlTool::new();
        assert_eq!(tool.definition().name, "fetch_url");
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let tool = FetchUrlTool::new();
        let out = tool
            .execute(json!({"url": "ftp://example.com"}), ToolContext::detached())
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("http://"));
    }
}
