use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::Utc;
use tracing::warn;

use crate::error::Error;

use super::{Checkpoint, Checkpointer, sanitize_thread_id};

/// One JSON file per thread in a directory. The filename uses a sanitized
/// form of the thread id; the display id is preserved inside the payload.
/// Corrupt files load as `None` and are overwritten by the next save.
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    /// Open (or create) the checkpoint directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Checkpoint(format!(
                    "failed to create checkpoint dir {}: {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(Self { dir })
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_thread_id(thread_id)))
    }

    async fn read_checkpoint(&self, path: &Path) -> Option<Checkpoint> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(cp) => Some(cp),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt checkpoint file, ignoring");
                None
            }
        }
    }
}

impl Checkpointer for FileCheckpointer {
    fn save<'a>(
        &'a self,
        checkpoint: &'a Checkpoint,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path_for(&checkpoint.thread_id);
            let mut stored = checkpoint.clone();
            stored.updated_at = Utc::now();
            // Preserve created_at from the first save; a sanitized-name
            // collision with a different display id is treated as overwrite.
            if let Some(existing) = self.read_checkpoint(&path).await {
                stored.created_at = existing.created_at;
            }
            let raw = serde_json::to_string_pretty(&stored)?;
            tokio::fs::write(&path, raw).await.map_err(|e| {
                Error::Checkpoint(format!("failed to write {}: {e}", path.display()))
            })
        })
    }

    fn load<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Checkpoint>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path_for(thread_id);
            Ok(self.read_checkpoint(&path).await)
        })
    }

    fn list(&self) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + '_>> {
        Box::pin(async move {
            let mut dir = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
                Error::Checkpoint(format!("failed to read {}: {e}", self.dir.display()))
            })?;
            let mut ids = Vec::new();
            while let Ok(Some(entry)) = dir.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                // The payload carries the display id, which may differ from
                // the sanitized filename.
                if let Some(cp) = self.read_checkpoint(&path).await {
                    ids.push(cp.thread_id);
                }
            }
            ids.sort();
            Ok(ids)
        })
    }

    fn delete<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.path_for(thread_id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::Checkpoint(format!(
                    "failed to delete {}: {e}",
                    path.display()
                ))),
            }
        })
    }

    fn exists<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + 'a>> {
        Box::pin(async move { Ok(self.path_for(thread_id).exists()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Message;
    use crate::state::AgentState;

    #[tokio::test]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path()).unwrap();

        let cp = Checkpoint::new("t1", 3, vec![Message::user("hello")], AgentState::default());
        store.save(&cp).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.thread_id, "t1");
        assert_eq!(loaded.step, 3);
        assert_eq!(loaded.messages, cp.messages);
        assert_eq!(loaded.created_at, cp.created_at);
    }

    #[tokio::test]
    async fn creates_directory_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep/checkpoints");
        let _store = FileCheckpointer::new(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn thread_id_is_sanitized_for_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path()).unwrap();

        let cp = Checkpoint::new("user/session 1", 0, vec![], AgentState::default());
        store.save(&cp).await.unwrap();

        assert!(dir.path().join("user_session_1.json").exists());
        // Display id survives in the payload
        let loaded = store.load("user/session 1").await.unwrap().unwrap();
        assert_eq!(loaded.thread_id, "user/session 1");
        assert_eq!(store.list().await.unwrap(), vec!["user/session 1"]);
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        assert!(store.load("broken").await.unwrap().is_none());
        // And the next save overwrites it
        store
            .save(&Checkpoint::new("broken", 1, vec![], AgentState::default()))
            .await
            .unwrap();
        assert_eq!(store.load("broken").await.unwrap().unwrap().step, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path()).unwrap();
        store.delete("never-existed").await.unwrap();

        store
            .save(&Checkpoint::new("t", 0, vec![], AgentState::default()))
            .await
            .unwrap();
        assert!(store.exists("t").await.unwrap());
        store.delete("t").await.unwrap();
        assert!(!store.exists("t").await.unwrap());
    }

    #[tokio::test]
    async fn save_preserves_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointer::new(dir.path()).unwrap();

        store
            .save(&Checkpoint::new("t", 0, vec![], AgentState::default()))
            .await
            .unwrap();
        let first = store.load("t").await.unwrap().unwrap();

        store
            .save(&Checkpoint::new("t", 1, vec![], AgentState::default()))
            .await
            .unwrap();
        let second = store.load("t").await.unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }
}
