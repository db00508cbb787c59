use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::events::AgentEvent;
use crate::error::Error;
use crate::llm::types::ToolDefinition;

use super::{Tool, ToolContext, ToolOutput, validate_tool_input};

/// The tool result the model sees when the user (or the default-deny
/// policy) rejects a call. A normal result, not an error: denial is an
/// answer, not a failure.
pub const DENIAL_MESSAGE: &str =
    "Tool execution denied by user. The call was not executed; ask the user how to proceed \
     or try a different approach.";

/// Async predicate deciding whether a specific call needs approval.
pub type ShouldApprove =
    dyn Fn(&serde_json::Value) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync;

/// Async callback consulted when a gated call needs a user decision.
/// Returns `true` to allow. When no callback is installed the gate denies.
pub type OnApproval =
    dyn Fn(ApprovalRequest) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync;

/// Per-tool gating policy.
#[derive(Clone)]
pub enum InterruptPolicy {
    /// Every call to this tool needs approval.
    Always,
    /// Calls pass through ungated.
    Never,
    /// The predicate decides per call, from the call's arguments.
    When(Arc<ShouldApprove>),
}

impl InterruptPolicy {
    /// Build a `When` policy from an async closure.
    pub fn when<F, Fut>(predicate: F) -> Self
    where
        F: Fn(&serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self::When(Arc::new(move |args| Box::pin(predicate(args))))
    }
}

impl std::fmt::Debug for InterruptPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => write!(f, "Always"),
            Self::Never => write!(f, "Never"),
            Self::When(_) => write!(f, "When(..)"),
        }
    }
}

/// A pending request for a user decision on one tool call. Created when a
/// gated tool is about to execute, destroyed after the decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

/// Wraps a tool's execute with input validation and the human-in-the-loop
/// gate. The wrapped tool keeps its name and schema untouched; only the
/// execute path changes.
///
/// Event order per invocation: `approval-requested` / `approval-response`
/// (when gated) precede `tool-call`, which precedes the loop's
/// `tool-result`.
pub struct ApprovalGate {
    inner: Arc<dyn Tool>,
    policy: InterruptPolicy,
    on_approval: Option<Arc<OnApproval>>,
}

impl ApprovalGate {
    pub fn new(
        inner: Arc<dyn Tool>,
        policy: InterruptPolicy,
        on_approval: Option<Arc<OnApproval>>,
    ) -> Self {
        Self {
            inner,
            policy,
            on_approval,
        }
    }

    async fn needs_approval(&self, input: &serde_json::Value) -> bool {
        match &self.policy {
            InterruptPolicy::Always => true,
            InterruptPolicy::Never => false,
            InterruptPolicy::When(predicate) => predicate(input).await,
        }
    }
}

impl Tool for ApprovalGate {
    fn definition(&self) -> ToolDefinition {
        self.inner.definition()
    }

    fn execute<'a>(
        &'a self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, Error>> + Send + 'a>> {
        Box::pin(async move {
            let def = self.inner.definition();

            if let Err(msg) = validate_tool_input(&def.input_schema, &input) {
                ctx.emitter.emit(AgentEvent::ToolCall {
                    tool_call_id: ctx.tool_call_id.clone(),
                    tool_name: def.name.clone(),
                    input: input.clone(),
                });
                return Ok(ToolOutput::error(msg));
            }

            let mut approved = true;
            if self.needs_approval(&input).await {
                let request = ApprovalRequest {
                    approval_id: Uuid::new_v4().to_string(),
                    tool_call_id: ctx.tool_call_id.clone(),
                    tool_name: def.name.clone(),
                    args: input.clone(),
                };
                ctx.emitter.emit(AgentEvent::ApprovalRequested {
                    approval_id: request.approval_id.clone(),
                    tool_call_id: request.tool_call_id.clone(),
                    tool_name: request.tool_name.clone(),
                    args: request.args.clone(),
                });
                approved = match &self.on_approval {
                    Some(callback) => callback(request.clone()).await,
                    // No callback installed: deterministic deny.
                    None => false,
                };
                ctx.emitter.emit(AgentEvent::ApprovalResponse {
                    approval_id: request.approval_id,
                    approved,
                });
            }

            ctx.emitter.emit(AgentEvent::ToolCall {
                tool_call_id: ctx.tool_call_id.clone(),
                tool_name: def.name.clone(),
                input: input.clone(),
            });

            if !approved {
                return Ok(ToolOutput::success(DENIAL_MESSAGE));
            }
            self.inner.execute(input, ctx).await
        })
    }
}

/// Wrap every tool in an [`ApprovalGate`] with its configured policy
/// (default `Never`). The gate is also the single emission point for
/// `tool-call` events, so every tool goes through it.
pub fn wrap_tools(
    tools: Vec<Arc<dyn Tool>>,
    interrupt_on: &HashMap<String, InterruptPolicy>,
    on_approval: Option<Arc<OnApproval>>,
) -> Vec<Arc<dyn Tool>> {
    tools
        .into_iter()
        .map(|tool| {
            let policy = interrupt_on
                .get(&tool.definition().name)
                .cloned()
                .unwrap_or(InterruptPolicy::Never);
            Arc::new(ApprovalGate::new(tool, policy, on_approval.clone())) as Arc<dyn Tool>
        })
        .collect()
}
