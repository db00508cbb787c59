use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::json;

use crate::agent::events::AgentEvent;
use crate::agent::{DeepAgent, SubAgentConfig};
use crate::backend::Backend;
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::ToolDefinition;
use crate::tool::approval::OnApproval;
use crate::tool::{Tool, ToolContext, ToolOutput};

/// Spawns an ephemeral sub-agent with its own tool set and prompt.
///
/// The child runs an isolated inner loop sharing the parent's backend but
/// not its message buffer; its final assistant text is returned verbatim
/// as this tool's result. A sub-agent may carry its own approval config
/// and uses the parent's approval callback.
pub struct TaskTool<P: LlmProvider> {
    provider: Arc<P>,
    backend: Arc<dyn Backend>,
    subagents: Vec<SubAgentConfig>,
    on_approval: Option<Arc<OnApproval>>,
}

impl<P: LlmProvider + 'static> TaskTool<P> {
    pub fn new(
        provider: Arc<P>,
        backend: Arc<dyn Backend>,
        subagents: Vec<SubAgentConfig>,
        on_approval: Option<Arc<OnApproval>>,
    ) -> Self {
        Self {
            provider,
            backend,
            subagents,
            on_approval,
        }
    }

    fn available(&self) -> String {
        self.subagents
            .iter()
            .map(|s| format!("{}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<P: LlmProvider + 'static> Tool for TaskTool<P> {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "task".into(),
            description: format!(
                "Delegate a task to an ephemeral sub-agent. Available agents:\n{}",
                self.available()
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subagent_type": {
                        "type": "string",
                        "description": "Name of the registered sub-agent to spawn"
                    },
                    "description": {
                        "type": "string",
                        "description": "Short summary of the delegated task"
                    },
                    "prompt": {
                        "type": "string",
                        "description": "The full task prompt for the sub-agent"
                    }
                },
                "required": ["subagent_type", "description", "prompt"]
            }),
        }
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let subagent_type = input
                .get("subagent_type")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("subagent_type is required".into()))?;

            let description = input
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();

            let prompt = input
                .get("prompt")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Agent("prompt is required".into()))?;

            let Some(config) = self.subagents.iter().find(|s| s.name == subagent_type) else {
                return Ok(ToolOutput::error(format!(
                    "Error: unknown sub-agent '{subagent_type}'. Available:\n{}",
                    self.available()
                )));
            };

            ctx.emitter.emit(AgentEvent::SubagentStart {
                name: config.name.clone(),
                description,
            });

            let mut builder = DeepAgent::builder(self.provider.clone())
                .system_prompt(&config.system_prompt)
                .backend(self.backend.clone())
                .tools(config.tools.clone())
                .interrupts(config.interrupt_on.clone())
                .max_steps(config.max_steps);
            if let Some(callback) = &self.on_approval {
                let callback = callback.clone();
                builder = builder.on_approval(move |request| {
                    let callback = callback.clone();
                    async move { callback(request).await }
                });
            }
            let child = builder.build();

            // The child's stream is consumed here; the parent only sees
            // coarse sub-agent progress events.
            let mut stream = child.run(prompt);
            let mut outcome: Option<ToolOutput> = None;
            while let Some(event) = stream.next().await {
                match event {
                    AgentEvent::StepStart { step } => {
                        ctx.emitter.emit(AgentEvent::SubagentStep {
                            name: config.name.clone(),
                            step,
                        });
                    }
                    AgentEvent::Done { final_text, .. } => {
                        outcome = Some(ToolOutput::success(final_text));
                    }
                    AgentEvent::Error { message } => {
                        outcome = Some(ToolOutput::error(format!(
                            "Error: sub-agent '{}' failed: {message}",
                            config.name
                        )));
                    }
                    _ => {}
                }
            }

            ctx.emitter.emit(AgentEvent::SubagentFinish {
                name: config.name.clone(),
            });

            Ok(outcome.unwrap_or_else(|| {
                ToolOutput::error(format!(
                    "Error: sub-agent '{}' produced no result",
                    config.name
                ))
            }))
        })
    }
}
