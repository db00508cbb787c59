pub mod file;
pub mod in_memory;
pub mod kv;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::llm::types::Message;
use crate::state::AgentState;

/// A serialized snapshot sufficient to resume a thread: the message buffer
/// plus the agent state, stamped with a monotone step counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub step: u64,
    pub messages: Vec<Message>,
    pub state: AgentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, step: u64, messages: Vec<Message>, state: AgentState) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            step,
            messages,
            state,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-thread persistence. Implementations overwrite on save, refresh
/// `updated_at`, and preserve `created_at` from the first save. A corrupt
/// stored checkpoint loads as `None`, and the next save overwrites it.
pub trait Checkpointer: Send + Sync {
    fn save<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    fn load<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, Error>> + Send + 'a>>;

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + '_>>;

    fn delete<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    fn exists<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + 'a>>;
}

/// Sanitize a thread id for filesystem use: anything outside
/// `[A-Za-z0-9_-]` becomes `_`. The display id stays in the payload; two
/// ids colliding after sanitization overwrite each other's file.
pub(crate) fn sanitize_thread_id(thread_id: &str) -> String {
    thread_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
