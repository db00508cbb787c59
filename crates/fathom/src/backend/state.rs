use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use crate::error::Error;
use crate::state::{AgentState, FileData, Todo};
use crate::util::{include_matches, normalize_path, normalize_prefix, path_matches_glob};

use super::{
    Backend, EntryInfo, GrepMatch, apply_edit, invalid_regex_error, not_found_error,
    overwrite_error,
};

/// In-process backend holding the full [`AgentState`] in memory.
///
/// Uses `std::sync::RwLock` (not tokio); locks are never held across an
/// `.await`. Writes are serialized by the agent loop's single-threaded
/// scheduling; the lock only guards against concurrent independent agents
/// sharing the same backend instance.
pub struct StateBackend {
    state: RwLock<AgentState>,
    overwrite: bool,
}

impl StateBackend {
    pub fn new() -> Self {
        Self::with_state(AgentState::default())
    }

    pub fn with_state(state: AgentState) -> Self {
        Self {
            state: RwLock::new(state),
            overwrite: false,
        }
    }

    /// Allow `write` to replace existing files.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, AgentState> {
        self.state.read().expect("state lock poisoned")
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, AgentState> {
        self.state.write().expect("state lock poisoned")
    }
}

impl Default for StateBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for StateBackend {
    fn read_raw<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FileData>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path).map_err(Error::Backend)?;
            Ok(self.read_lock().files.get(&norm).cloned())
        })
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path)?;
            let mut state = self.write_lock();
            if state.files.contains_key(&norm) {
                if !self.overwrite {
                    return Err(overwrite_error(&norm));
                }
                if let Some(existing) = state.files.get_mut(&norm) {
                    existing.set_text(content);
                }
            } else {
                state.files.insert(norm.clone(), FileData::new(content));
            }
            Ok(norm)
        })
    }

    fn edit<'a>(
        &'a self,
        path: &'a str,
        old_string: &'a str,
        new_string: &'a str,
        replace_all: bool,
    ) -> Pin<Box<dyn Future<Output = Result<usize, String>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path)?;
            let mut state = self.write_lock();
            let Some(file) = state.files.get_mut(&norm) else {
                return Err(not_found_error(&norm));
            };
            let (new_text, count) = apply_edit(&file.text(), old_string, new_string, replace_all)?;
            file.set_text(&new_text);
            Ok(count)
        })
    }

    fn ls_info<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = normalize_prefix(prefix);
            let state = self.read_lock();
            let mut files = Vec::new();
            let mut dirs = BTreeSet::new();
            for path in state.files.keys() {
                let Some(rest) = path.strip_prefix(&prefix) else {
                    continue;
                };
                if rest.is_empty() {
                    continue;
                }
                match rest.find('/') {
                    Some(idx) => {
                        dirs.insert(format!("{prefix}{}/", &rest[..idx]));
                    }
                    None => files.push(EntryInfo::file(path.clone())),
                }
            }
            let mut entries: Vec<EntryInfo> = dirs.into_iter().map(EntryInfo::dir).collect();
            entries.extend(files);
            entries
        })
    }

    fn glob_info<'a>(
        &'a self,
        pattern: &'a str,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = normalize_prefix(prefix);
            let state = self.read_lock();
            state
                .files
                .keys()
                .filter_map(|path| {
                    let rel = path.strip_prefix(&prefix)?;
                    path_matches_glob(pattern, rel, false).then(|| EntryInfo::file(path.clone()))
                })
                .collect()
        })
    }

    fn grep_raw<'a>(
        &'a self,
        pattern: &'a str,
        prefix: &'a str,
        include: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<GrepMatch>, String>> + Send + 'a>> {
        Box::pin(async move {
            let re = regex::Regex::new(pattern).map_err(|e| invalid_regex_error(&e))?;
            let prefix = normalize_prefix(prefix);
            let state = self.read_lock();
            let mut matches = Vec::new();
            for (path, data) in &state.files {
                let Some(rel) = path.strip_prefix(&prefix) else {
                    continue;
                };
                if let Some(filter) = include
                    && !include_matches(filter, rel)
                {
                    continue;
                }
                for (idx, line) in data.content.iter().enumerate() {
                    if re.is_match(line) {
                        matches.push(GrepMatch {
                            path: path.clone(),
                            line: idx + 1,
                            text: line.clone(),
                        });
                    }
                }
            }
            Ok(matches)
        })
    }

    fn get_todos(&self) -> Pin<Box<dyn Future<Output = Vec<Todo>> + Send + '_>> {
        Box::pin(async move { self.read_lock().todos.clone() })
    }

    fn set_todos(&self, todos: Vec<Todo>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.write_lock().todos = todos;
        })
    }

    fn export_state(&self) -> Pin<Box<dyn Future<Output = AgentState> + Send + '_>> {
        Box::pin(async move { self.read_lock().clone() })
    }

    fn import_state(&self, state: AgentState) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.write_lock() = state;
        })
    }
}
