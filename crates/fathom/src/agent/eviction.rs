use tracing::{debug, warn};

use crate::backend::Backend;

use super::token_estimator::estimate_tokens;

/// Default tool-result eviction threshold, in estimated tokens.
pub(crate) const DEFAULT_EVICTION_LIMIT: u32 = 20_000;

/// Directory in the virtual filesystem where evicted results land.
const EVICTION_DIR: &str = "/tool-results";

/// If a tool result exceeds the eviction limit, write the full text into
/// the filesystem backend and return a short pointer for the message
/// buffer. The result is never lost: when the write fails, the original
/// content is kept in the buffer.
pub(crate) async fn maybe_evict(
    backend: &dyn Backend,
    tool_name: &str,
    tool_call_id: &str,
    content: String,
    limit: u32,
) -> String {
    let tokens = estimate_tokens(&content);
    if tokens <= limit {
        return content;
    }

    let path = format!("{EVICTION_DIR}/{tool_name}-{tool_call_id}.txt");
    match backend.write(&path, &content).await {
        Ok(written) => {
            debug!(tool = tool_name, path = %written, tokens, "evicted oversized tool result");
            format!(
                "Tool result was too large for the context window (~{tokens} tokens, {} chars) \
                 and was saved to {written}. Use read_file to inspect it.",
                content.len()
            )
        }
        Err(e) => {
            warn!(tool = tool_name, error = %e, "tool result eviction failed, keeping inline");
            content
        }
    }
}
