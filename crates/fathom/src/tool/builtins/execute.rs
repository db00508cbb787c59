use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::tool::{Tool, ToolContext, ToolOutput};
use crate::util::floor_char_boundary;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Result of a sandboxed command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Capability for running shell commands. The harness does not sandbox
/// anything itself; callers supply an implementation with whatever
/// isolation they need.
pub trait Sandbox: Send + Sync {
    fn exec<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult, Error>> + Send + 'a>>;
}

/// Pass-through [`Sandbox`] running commands with `bash -c` on the host.
/// No isolation; use only in trusted environments.
pub struct ProcessSandbox;

impl Sandbox for ProcessSandbox {
    fn exec<'a>(
        &'a self,
        command: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecResult, Error>> + Send + 'a>> {
        Box::pin(async move {
            let child = tokio::process::Command::new("bash")
                .arg("-c")
                .arg(command)
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| Error::Agent(format!("Failed to spawn bash: {e}")))?;

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| Error::Agent(format!("Command failed: {e}")))?;

            Ok(ExecResult {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            })
        })
    }
}

pub struct ExecuteTool {
    sandbox: Arc<dyn Sandbox>,
}

impl ExecuteTool {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

impl Tool for ExecuteTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "execute".into(),
            description: "Run a shell command through the configured sandbox. Captures stdout \
                          and stderr. Default timeout: 30s."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to execute"
                    },
                    "timeout": {
                        "type": "number",
                        "description": "Timeout in seconds (default 30, max 600)"
                    }
                },
                "required": ["command"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let command = input
                .get("command")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("command is required".into()))?;

            let timeout_secs = input
                .get("timeout")
                .and_then(|v| v.as_u64())
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .min(MAX_TIMEOUT_SECS);

            ctx.emitter.emit(AgentEvent::ExecuteStart {
                command: command.into(),
            });

            let result = match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.sandbox.exec(command),
            )
            .await
            {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    ctx.emitter.emit(AgentEvent::ExecuteFinish { exit_code: -1 });
                    return Ok(ToolOutput::error(format!("Error: {e}")));
                }
                Err(_) => {
                    // Dropping the exec future kills the child (kill_on_drop)
                    ctx.emitter.emit(AgentEvent::ExecuteFinish { exit_code: -1 });
                    return Ok(ToolOutput::error(format!(
                        "Error: Command timed out after {timeout_secs}s"
                    )));
                }
            };

            ctx.emitter.emit(AgentEvent::ExecuteFinish {
                exit_code: result.exit_code,
            });

            let mut combined = String::new();
            if !result.stdout.is_empty() {
                combined.push_str(&result.stdout);
            }
            if !result.stderr.is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str("stderr:\n");
                combined.push_str(&result.stderr);
            }
            if combined.len() > MAX_OUTPUT_CHARS {
                let cut = floor_char_boundary(&combined, MAX_OUTPUT_CHARS);
                combined.truncate(cut);
                combined.push_str("\n[output truncated]");
            }
            if combined.is_empty() {
                combined = "(no output)".into();
            }

            if result.exit_code == 0 {
                Ok(ToolOutput::success(combined))
            } else {
                Ok(ToolOutput::error(format!(
                    "Command exited with code {}:\n{combined}",
                    result.exit_code
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSandbox {
        result: ExecResult,
    }

    impl Sandbox for FakeSandbox {
        fn exec<'a>(
            &'a self,
            _command: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<ExecResult, Error>> + Send + 'a>> {
            let result = self.result.clone();
            Box::pin(async move { Ok(result) })
        }
    }

    struct HangingSandbox;

    impl Sandbox for HangingSandbox {
        fn exec<'a>(
            &'a self,
            _command: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<ExecResult, Error>> + Send + 'a>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            })
        }
    }

    #[test]
    fn definition_has_correct_name() {
        let tool = ExecuteTool::new(Arc::new(ProcessSandbox));
        assert_eq!(tool.definition().name, "execute");
    }

    #[tokio::test]
    async fn success_returns_stdout() {
        let tool = ExecuteTool::new(Arc::new(FakeSandbox {
            result: ExecResult {
                stdout: "hello\n".into(),
                stderr: String::new(),
                exit_code: 0,
            },
        }));
        let out = tool
            .execute(json!({"command": "echo hello"}), ToolContext::detached())
            .await
            .unwrap();
        assert!(!out.is_error);
        assert_eq!(out.content, "hello\n");
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_result() {
        let tool = ExecuteTool::new(Arc::new(FakeSandbox {
            result: ExecResult {
                stdout: String::new(),
                stderr: "boom".into(),
                exit_code: 2,
            },
        }));
        let out = tool
            .execute(json!({"command": "false"}), ToolContext::detached())
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("code 2"));
        assert!(out.content.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_surfaces_as_error_result() {
        let tool = ExecuteTool::new(Arc::new(HangingSandbox));
        let out = tool
            .execute(
                json!({"command": "sleep 9999", "timeout": 1}),
                ToolContext::detached(),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("timed out after 1s"));
    }

    #[tokio::test]
    async fn process_sandbox_runs_commands() {
        let sandbox = ProcessSandbox;
        let result = sandbox.exec("echo from-bash").await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("from-bash"));
    }
}
