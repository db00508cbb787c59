use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};
use crate::util::floor_char_boundary;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 120;
const MAX_OUTPUT_CHARS: usize = 50_000;

pub struct HttpRequestTool {
    client: reqwest::Client,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("fathom/0.1")
                .build()
                .expect("failed to build reqwest client"),
        }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for HttpRequestTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "http_request".into(),
            description: "Make an HTTP request. Supports GET, POST, PUT, PATCH, DELETE, HEAD \
                          with optional headers and body."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to request"
                    },
                    "method": {
                        "type": "string",
                        "enum": ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"],
                        "description": "HTTP method (default GET)"
                    },
                    "headers": {
                        "type": "object",
                        "description": "Request headers as string key-value pairs"
                    },
                    "body": {
                        "type": "string",
                        "description": "Request body"
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

            let method = input
                .get("method")
                .and_then(|v| v.as_str())
                .unwrap_or("GET")
                .to_ascii_uppercase();

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

            let method = match reqwest::Method::from_bytes(method.as_bytes()) {
                Ok(m) => m,
                Err(_) => {
                    return Ok(ToolOutput::error(format!(
                        "Error: unsupported method '{method}'"
                    )));
                }
            };

            ctx.emitter
                .emit(AgentEvent::HttpRequestStart { url: url.into() });

            let mut request = self
                .client
                .request(method, url)
                .timeout(Duration::from_secs(timeout_secs));

            if let Some(headers) = input.get("headers").and_then(|v| v.as_object()) {
                for (key, value) in headers {
                    if let Some(value) = value.as_str() {
                        request = request.header(key, value);
                    }
                }
            }
            if let Some(body) = input.get("body").and_then(|v| v.as_str()) {
                request = request.body(body.to_string());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    ctx.emitter.emit(AgentEvent::HttpRequestFinish {
                        url: url.into(),
                        status: 0,
                    });
                    return Ok(ToolOutput::error(format!("Error: request failed: {e}")));
                }
            };

            let status = response.status().as_u16();
            ctx.emitter.emit(AgentEvent::HttpRequestFinish {
                url: url.into(),
                status,
            });

            let mut body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    return Ok(ToolOutput::error(format!(
                        "Error: failed to read response body: {e}"
                    )));
                }
            };
            if body.len() > MAX_OUTPUT_CHARS {
                let cut = floor_char_boundary(&body, MAX_OUTPUT_CHARS);
                body.truncate(cut);
                body.push_str("\n[response truncated]");
            }

            Ok(ToolOutput::success(format!("HTTP {status}\n\n{body}")))
        })
    }
}
