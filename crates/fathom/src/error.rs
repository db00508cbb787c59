use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Max steps ({0}) exceeded")]
    MaxStepsExceeded(u64),

    #[error("Response truncated (max_tokens reached)")]
    Truncated,
}

impl Error {
    /// Whether this failure is transient from the loop's point of view.
    ///
    /// Only provider-side failures qualify: rate limiting, server-side
    /// errors, and transport failures that never produced a response.
    /// Everything the harness itself raises (backend, checkpoint, agent,
    /// config, parse failures) is deterministic; retrying would repeat the
    /// same work and fail the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
