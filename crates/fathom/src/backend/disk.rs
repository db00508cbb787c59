use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::state::{AgentState, FileData, Todo};
use crate::util::{include_matches, normalize_path, normalize_prefix};

use super::{
    Backend, EntryInfo, GrepMatch, apply_edit, invalid_regex_error, overwrite_error,
};

const MAX_GREP_MATCHES: usize = 1000;

/// Backend mirroring the virtual path space onto a real disk directory.
///
/// Virtual `/foo/bar` maps to `<root>/foo/bar`. Traversal that would escape
/// the root is rejected. Timestamps come from filesystem metadata. Todos
/// live in process memory and travel in checkpoints, not on disk.
pub struct DiskBackend {
    root: PathBuf,
    todos: RwLock<Vec<Todo>>,
    overwrite: bool,
}

impl DiskBackend {
    /// Open (or create) a backend rooted at the given directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| {
                Error::Backend(format!("failed to create root {}: {e}", root.display()))
            })?;
        }
        let root = root.canonicalize().map_err(|e| {
            Error::Backend(format!("failed to canonicalize {}: {e}", root.display()))
        })?;
        Ok(Self {
            root,
            todos: RwLock::new(Vec::new()),
            overwrite: false,
        })
    }

    /// Allow `write` to replace existing files.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Translate a virtual path into a real one, rejecting escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, String> {
        let norm = normalize_path(path)?;
        let candidate = self.root.join(norm.trim_start_matches('/'));
        let resolved = normalize_components(&candidate);
        if !resolved.starts_with(&self.root) {
            return Err(format!("Error: Path '{norm}' escapes the backend root"));
        }
        Ok(resolved)
    }

    fn file_data_from_disk(path: &Path, text: &str) -> FileData {
        let mut data = FileData::new(text);
        if let Ok(meta) = std::fs::metadata(path) {
            if let Ok(modified) = meta.modified() {
                data.modified_at = DateTime::<Utc>::from(modified);
            }
            match meta.created() {
                Ok(created) => data.created_at = DateTime::<Utc>::from(created),
                Err(_) => data.created_at = data.modified_at,
            }
        }
        data
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
/// `canonicalize()` requires the path to exist; this does not.
fn normalize_components(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                _ => components.push(component),
            },
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

/// Recursive grep over a real directory. Runs on a blocking thread.
fn grep_dir(
    re: &regex::Regex,
    dir: &Path,
    base: &Path,
    include: Option<&str>,
    matches: &mut Vec<GrepMatch>,
    virtual_prefix: &str,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if matches.len() >= MAX_GREP_MATCHES {
            return;
        }
        let path = entry.path();
        let name = entry.file_name();
        if name.to_str().is_some_and(|s| s.starts_with('.')) {
            continue;
        }
        if path.is_dir() {
            grep_dir(re, &path, base, include, matches, virtual_prefix);
            continue;
        }
        let rel = path
            .strip_prefix(base)
            .map(|r| r.display().to_string())
            .unwrap_or_default();
        if let Some(filter) = include
            && !include_matches(filter, &rel)
        {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue; // binary or unreadable
        };
        for (idx, line) in text.split('\n').enumerate() {
            if re.is_match(line) {
                matches.push(GrepMatch {
                    path: format!("{virtual_prefix}{rel}"),
                    line: idx + 1,
                    text: line.to_string(),
                });
                if matches.len() >= MAX_GREP_MATCHES {
                    return;
                }
            }
        }
    }
}

impl Backend for DiskBackend {
    fn read_raw<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FileData>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let real = self.resolve(path).map_err(Error::Backend)?;
            if !real.is_file() {
                return Ok(None);
            }
            let bytes = tokio::fs::read(&real)
                .await
                .map_err(|e| Error::Backend(format!("cannot read {}: {e}", real.display())))?;
            let text = String::from_utf8_lossy(&bytes);
            Ok(Some(Self::file_data_from_disk(&real, &text)))
        })
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path)?;
            let real = self.resolve(path)?;
            if real.exists() && !self.overwrite {
                return Err(overwrite_error(&norm));
            }
            if let Some(parent) = real.parent()
                && !parent.exists()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| format!("Error: Cannot create directories: {e}"))?;
            }
            tokio::fs::write(&real, content)
                .await
                .map_err(|e| format!("Error: Cannot write file: {e}"))?;
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
            let real = self.resolve(path)?;
            if !real.is_file() {
                return Err(super::not_found_error(&norm));
            }
            let text = tokio::fs::read_to_string(&real)
                .await
                .map_err(|e| format!("Error: Cannot read file: {e}"))?;
            let (new_text, count) = apply_edit(&text, old_string, new_string, replace_all)?;
            tokio::fs::write(&real, new_text)
                .await
                .map_err(|e| format!("Error: Cannot write file: {e}"))?;
            Ok(count)
        })
    }

    fn ls_info<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = normalize_prefix(prefix);
            let Ok(real) = self.resolve(&prefix) else {
                return Vec::new();
            };
            let Ok(mut dir) = tokio::fs::read_dir(&real).await else {
                return Vec::new();
            };
            let mut entries = Vec::new();
            while let Ok(Some(entry)) = dir.next_entry().await {
                let name = entry.file_name();
                let Some(name) = name.to_str() else {
                    continue;
                };
                let is_dir = entry
                    .file_type()
                    .await
                    .map(|t| t.is_dir())
                    .unwrap_or(false);
                if is_dir {
                    entries.push(EntryInfo::dir(format!("{prefix}{name}/")));
                } else {
                    entries.push(EntryInfo::file(format!("{prefix}{name}")));
                }
            }
            entries.sort_by(|a, b| a.path.cmp(&b.path));
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
            let Ok(base) = self.resolve(&prefix) else {
                return Vec::new();
            };
            // Escape the base so its characters are not glob metacharacters
            let full_pattern = format!(
                "{}/{pattern}",
                glob::Pattern::escape(base.display().to_string().trim_end_matches('/'))
            );
            let this_root = self.root.clone();
            tokio::task::spawn_blocking(move || {
                let Ok(paths) = glob::glob(&full_pattern) else {
                    return Vec::new();
                };
                let mut entries = Vec::new();
                for path in paths.flatten() {
                    if !path.is_file() {
                        continue;
                    }
                    let relative = path.strip_prefix(&base).unwrap_or(&path);
                    let hidden = relative
                        .components()
                        .any(|c| c.as_os_str().to_str().is_some_and(|s| s.starts_with('.')));
                    if hidden {
                        continue;
                    }
                    let rel = path.strip_prefix(&this_root).unwrap_or(&path);
                    entries.push(EntryInfo::file(format!("/{}", rel.display())));
                }
                entries.sort_by(|a, b| a.path.cmp(&b.path));
                entries
            })
            .await
            .unwrap_or_default()
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
            let base = self.resolve(&prefix)?;
            if !base.exists() {
                return Ok(Vec::new());
            }
            let include = include.map(String::from);
            tokio::task::spawn_blocking(move || {
                let mut matches = Vec::new();
                grep_dir(
                    &re,
                    &base,
                    &base,
                    include.as_deref(),
                    &mut matches,
                    &prefix,
                );
                Ok(matches)
            })
            .await
            .map_err(|e| format!("Error: grep task failed: {e}"))?
        })
    }

    fn get_todos(&self) -> Pin<Box<dyn Future<Output = Vec<Todo>> + Send + '_>> {
        Box::pin(async move { self.todos.read().expect("todos lock poisoned").clone() })
    }

    fn set_todos(&self, todos: Vec<Todo>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.todos.write().expect("todos lock poisoned") = todos;
        })
    }

    fn export_state(&self) -> Pin<Box<dyn Future<Output = AgentState> + Send + '_>> {
        // File bodies already persist on disk; only todos ride the checkpoint.
        Box::pin(async move {
            AgentState {
                todos: self.todos.read().expect("todos lock poisoned").clone(),
                files: Default::default(),
            }
        })
    }

    fn import_state(&self, state: AgentState) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.todos.write().expect("todos lock poisoned") = state.todos;
        })
    }
}
