use tracing::debug;

use crate::error::Error;
use crate::llm::LlmProvider;
use crate::llm::types::{CompletionRequest, ContentBlock, Message};

use super::token_estimator::estimate_buffer_tokens;

/// Default buffer size (estimated tokens) that triggers summarization.
pub(crate) const DEFAULT_TOKEN_THRESHOLD: u32 = 170_000;

/// Hard ceiling for the configurable threshold.
pub(crate) const MAX_TOKEN_THRESHOLD: u32 = 200_000;

/// Default number of recent messages preserved verbatim.
pub(crate) const DEFAULT_KEEP_MESSAGES: usize = 6;

const SUMMARY_PROMPT: &str =
    "You are a summarization assistant. Summarize the following conversation concisely, \
     preserving key facts, decisions, file paths, and tool results. Focus on information \
     that would be needed to continue the conversation.";

/// Marker prefixing the injected summary message so consumers can tell it
/// apart from ordinary system content.
pub(crate) const SUMMARY_MARKER: &str = "[conversation summary]";

pub(crate) fn needs_summary(messages: &[Message], threshold: u32) -> bool {
    estimate_buffer_tokens(messages) > threshold
}

/// Index where the summarized prefix ends and the preserved tail begins.
///
/// Starts at `len - keep` and moves backward while the tail would open with
/// a tool-result message, so a pending tool-call/tool-result pair is never
/// split. Returns 0 when there is nothing worth summarizing.
pub(crate) fn split_point(messages: &[Message], keep: usize) -> usize {
    if messages.len() <= keep {
        return 0;
    }
    let mut split = messages.len() - keep;
    while split > 0 && messages[split].has_tool_results() {
        split -= 1;
    }
    split
}

/// Flatten messages into plain text for the summarization request.
pub(crate) fn conversation_text(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let role = format!("{:?}", message.role).to_lowercase();
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => {
                    out.push_str(&format!("{role}: {text}\n"));
                }
                ContentBlock::ToolUse { name, input, .. } => {
                    out.push_str(&format!("{role} called {name}({input})\n"));
                }
                ContentBlock::ToolResult { content, .. } => {
                    out.push_str(&format!("tool result: {content}\n"));
                }
            }
        }
    }
    out
}

/// Compress the message buffer: all but the last `keep` messages are
/// replaced by a single system-role summary message generated by the model.
/// Idempotent when the buffer is already under `threshold` or too short.
pub(crate) async fn summarize_if_needed<P: LlmProvider>(
    provider: &P,
    messages: Vec<Message>,
    threshold: u32,
    keep: usize,
) -> Result<Vec<Message>, Error> {
    if !needs_summary(&messages, threshold) {
        return Ok(messages);
    }
    let split = split_point(&messages, keep);
    if split == 0 {
        return Ok(messages);
    }

    debug!(
        summarized = split,
        kept = messages.len() - split,
        "buffer over threshold, summarizing prefix"
    );

    let request = CompletionRequest {
        system: SUMMARY_PROMPT.into(),
        messages: vec![Message::user(conversation_text(&messages[..split]))],
        tools: vec![],
        max_tokens: 1024,
    };
    let response = provider.complete(request).await?;

    let mut compacted =
        vec![Message::system(format!("{SUMMARY_MARKER}\n{}", response.text()))];
    compacted.extend_from_slice(&messages[split..]);
    Ok(compacted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{CompletionResponse, Role, StopReason, TokenUsage, ToolResult};
    use serde_json::json;
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<Vec<CompletionResponse>>,
    }

    impl ScriptedProvider {
        fn text(text: &str) -> Self {
            Self {
                responses: Mutex::new(vec![CompletionResponse {
                    content: vec![ContentBlock::Text { text: text.into() }],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                }]),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, Error> {
            let mut responses = self.responses.lock().expect("mock lock poisoned");
            if responses.is_empty() {
                return Err(Error::Agent("no more scripted responses".into()));
            }
            Ok(responses.remove(0))
        }
    }

    fn long_message(chars: usize) -> Message {
        Message::user("m".repeat(chars))
    }

    #[test]
    fn needs_summary_respects_threshold() {
        let messages = vec![long_message(400)]; // ~100 tokens
        assert!(!needs_summary(&messages, 1000));
        assert!(needs_summary(&messages, 50));
    }

    #[test]
    fn split_point_keeps_tail() {
        let messages: Vec<Message> = (0..12).map(|i| Message::user(format!("m{i}"))).collect();
        assert_eq!(split_point(&messages, 6), 6);
    }

    #[test]
    fn split_point_skips_short_buffers() {
        let messages: Vec<Message> = (0..4).map(|i| Message::user(format!("m{i}"))).collect();
        assert_eq!(split_point(&messages, 6), 0);
    }

    #[test]
    fn split_point_never_splits_tool_pair() {
        // index 5 starts the tail, but it's a tool-result message whose
        // tool-call sits at index 4, so the boundary must move back past it.
        let mut messages: Vec<Message> = (0..4).map(|i| Message::user(format!("m{i}"))).collect();
        messages.push(Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "c1".into(),
                name: "grep".into(),
                input: json!({}),
            }],
        });
        messages.push(Message::tool_results(vec![ToolResult::success("c1", "hit")]));
        messages.extend((0..5).map(|i| Message::user(format!("tail{i}"))));
        // len = 11, keep = 6 → naive split at 5 (the tool-result message)
        let split = split_point(&messages, 6);
        assert_eq!(split, 4, "boundary must back off before the tool-call");
    }

    #[tokio::test]
    async fn summarize_replaces_prefix_with_system_message() {
        // 12 messages, each ~250 tokens → ~3000 total; threshold 1000
        let messages: Vec<Message> = (0..12).map(|_| long_message(1000)).collect();
        let provider = ScriptedProvider::text("everything so far");

        let compacted = summarize_if_needed(&provider, messages, 1000, 6)
            .await
            .unwrap();
        assert_eq!(compacted.len(), 7, "1 summary + last 6");
        assert_eq!(compacted[0].role, Role::System);
        assert!(compacted[0].text().starts_with(SUMMARY_MARKER));
        assert!(compacted[0].text().contains("everything so far"));
    }

    #[tokio::test]
    async fn summarize_is_noop_under_threshold() {
        let messages: Vec<Message> = (0..12).map(|i| Message::user(format!("m{i}"))).collect();
        let provider = ScriptedProvider::text("should not be used");

        let out = summarize_if_needed(&provider, messages.clone(), 1_000_000, 6)
            .await
            .unwrap();
        assert_eq!(out, messages);

        // Second pass on the unchanged buffer is also a no-op
        let again = summarize_if_needed(&provider, out.clone(), 1_000_000, 6)
            .await
            .unwrap();
        assert_eq!(again, out);
    }

    #[tokio::test]
    async fn summarize_skips_buffers_shorter_than_keep() {
        let messages = vec![long_message(100_000)]; // over any threshold
        let provider = ScriptedProvider::text("unused");
        let out = summarize_if_needed(&provider, messages.clone(), 1000, 6)
            .await
            .unwrap();
        assert_eq!(out, messages);
    }
}
