use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::eviction::DEFAULT_EVICTION_LIMIT;
use crate::agent::summarize::{DEFAULT_KEEP_MESSAGES, DEFAULT_TOKEN_THRESHOLD, MAX_TOKEN_THRESHOLD};
use crate::error::Error;

const DEFAULT_MAX_STEPS: u64 = 100;
pub(crate) const DEFAULT_SUBAGENT_MAX_STEPS: u64 = 50;

/// Numeric knobs of the step loop. Loadable from TOML for deployments that
/// keep tuning outside code; every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOptions {
    /// Upper bound on model-call cycles per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Estimated-token buffer size that triggers summarization.
    /// Clamped to 200,000.
    #[serde(default = "default_token_threshold")]
    pub token_threshold: u32,
    /// Recent messages preserved verbatim when summarizing.
    #[serde(default = "default_keep_messages")]
    pub keep_messages: usize,
    /// Tool-result size (estimated tokens) that triggers eviction into the
    /// filesystem backend.
    #[serde(default = "default_eviction_limit")]
    pub eviction_limit: u32,
}

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

fn default_token_threshold() -> u32 {
    DEFAULT_TOKEN_THRESHOLD
}

fn default_keep_messages() -> usize {
    DEFAULT_KEEP_MESSAGES
}

fn default_eviction_limit() -> u32 {
    DEFAULT_EVICTION_LIMIT
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            keep_messages: DEFAULT_KEEP_MESSAGES,
            eviction_limit: DEFAULT_EVICTION_LIMIT,
        }
    }
}

impl LoopOptions {
    /// Parse options from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let mut options: LoopOptions =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid options: {e}")))?;
        options.token_threshold = options.token_threshold.min(MAX_TOKEN_THRESHOLD);
        Ok(options)
    }

    /// Load options from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}
