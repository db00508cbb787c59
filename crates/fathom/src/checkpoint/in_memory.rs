use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::error::Error;

use super::{Checkpoint, Checkpointer};

/// Process-local checkpointer. Clones share the underlying map; an
/// optional namespace isolates multiple savers sharing one process (each
/// sees only its own threads).
#[derive(Clone)]
pub struct InMemoryCheckpointer {
    threads: Arc<RwLock<HashMap<String, Checkpoint>>>,
    namespace: String,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
            namespace: String::new(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, thread_id: &str) -> String {
        format!("{}:{thread_id}", self.namespace)
    }
}

impl Default for InMemoryCheckpointer {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkpointer for InMemoryCheckpointer {
    fn save<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let key = self.key(&checkpoint.thread_id);
            let mut threads = self.threads.write().expect("checkpoint lock poisoned");
            let mut stored = checkpoint.clone();
            stored.updated_at = Utc::now();
            if let Some(existing) = threads.get(&key) {
                stored.created_at = existing.created_at;
            }
            threads.insert(key, stored);
            Ok(())
        })
    }

    fn load<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let threads = self.threads.read().expect("checkpoint lock poisoned");
            Ok(threads.get(&self.key(thread_id)).cloned())
        })
    }

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + '_>> {
        Box::pin(async move {
            let prefix = format!("{}:", self.namespace);
            let threads = self.threads.read().expect("checkpoint lock poisoned");
            let mut ids: Vec<String> = threads
                .iter()
                .filter(|(key, _)| key.starts_with(&prefix))
                .map(|(_, cp)| cp.thread_id.clone())
                .collect();
            ids.sort();
            Ok(ids)
        })
    }

    fn delete<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            self.threads
                .write()
                .expect("checkpoint lock poisoned")
                .remove(&self.key(thread_id));
            Ok(())
        })
    }

    fn exists<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + 'a>> {
        Box::pin(async move {
            let threads = self.threads.read().expect("checkpoint lock poisoned");
            Ok(threads.contains_key(&self.key(thread_id)))
        })
    }
}
