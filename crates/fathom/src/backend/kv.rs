use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use crate::error::Error;
use crate::state::{AgentState, FileData, Todo};
use crate::util::{include_matches, normalize_path, normalize_prefix, path_matches_glob};

use super::{
    Backend, EntryInfo, GrepMatch, apply_edit, invalid_regex_error, not_found_error,
    overwrite_error,
};

/// Abstract key-value store with prefix enumeration. The backing store must
/// support `list_with_prefix` for directory-style listing to work.
pub trait KvStore: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, Error>> + Send + 'a>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    /// All keys beginning with `prefix`, in lexicographic order.
    fn list_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + 'a>>;
}

/// Process-local [`KvStore`] for tests and composition.
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKvStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, Error>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .entries
                .read()
                .expect("kv lock poisoned")
                .get(key)
                .cloned())
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            self.entries
                .write()
                .expect("kv lock poisoned")
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            self.entries.write().expect("kv lock poisoned").remove(key);
            Ok(())
        })
    }

    fn list_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + 'a>> {
        Box::pin(async move {
            Ok(self
                .entries
                .read()
                .expect("kv lock poisoned")
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        })
    }
}

/// Backend persisting one serialized [`FileData`] per file in a [`KvStore`],
/// under an optional namespace. Todos live under a single fixed key.
pub struct KvBackend {
    store: Arc<dyn KvStore>,
    namespace: String,
    overwrite: bool,
}

impl KvBackend {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            namespace: String::new(),
            overwrite: false,
        }
    }

    /// Isolate this backend's keys under `namespace`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Allow `write` to replace existing files.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn ns_prefix(&self) -> String {
        if self.namespace.is_empty() {
            String::new()
        } else {
            format!("{}/", self.namespace)
        }
    }

    fn file_key(&self, path: &str) -> String {
        format!("{}files{path}", self.ns_prefix())
    }

    fn files_prefix(&self) -> String {
        format!("{}files/", self.ns_prefix())
    }

    fn todos_key(&self) -> String {
        format!("{}todos", self.ns_prefix())
    }

    fn path_from_key(&self, key: &str) -> String {
        let skip = self.ns_prefix().len() + "files".len();
        key[skip..].to_string()
    }

    async fn load_file(&self, path: &str) -> Result<Option<FileData>, Error> {
        let key = self.file_key(path);
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store_file(&self, path: &str, data: &FileData) -> Result<(), Error> {
        let key = self.file_key(path);
        let raw = serde_json::to_string(data)?;
        self.store.set(&key, &raw).await
    }

    async fn all_paths(&self) -> Result<Vec<String>, Error> {
        let keys = self.store.list_with_prefix(&self.files_prefix()).await?;
        Ok(keys.iter().map(|k| self.path_from_key(k)).collect())
    }
}

impl Backend for KvBackend {
    fn read_raw<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FileData>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path).map_err(Error::Backend)?;
            self.load_file(&norm).await
        })
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path)?;
            let existing = self
                .load_file(&norm)
                .await
                .map_err(|e| format!("Error: storage failure: {e}"))?;
            let data = match existing {
                Some(mut file) if self.overwrite => {
                    file.set_text(content);
                    file
                }
                Some(_) => return Err(overwrite_error(&norm)),
                None => FileData::new(content),
            };
            self.store_file(&norm, &data)
                .await
                .map_err(|e| format!("Error: storage failure: {e}"))?;
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
            let mut file = self
                .load_file(&norm)
                .await
                .map_err(|e| format!("Error: storage failure: {e}"))?
                .ok_or_else(|| not_found_error(&norm))?;
            let (new_text, count) = apply_edit(&file.text(), old_string, new_string, replace_all)?;
            file.set_text(&new_text);
            self.store_file(&norm, &file)
                .await
                .map_err(|e| format!("Error: storage failure: {e}"))?;
            Ok(count)
        })
    }

    fn ls_info<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = normalize_prefix(prefix);
            let Ok(paths) = self.all_paths().await else {
                return Vec::new();
            };
            let mut files = Vec::new();
            let mut dirs = BTreeSet::new();
            for path in paths {
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
            let Ok(paths) = self.all_paths().await else {
                return Vec::new();
            };
            paths
                .into_iter()
                .filter(|path| {
                    path.strip_prefix(&prefix)
                        .is_some_and(|rel| path_matches_glob(pattern, rel, false))
                })
                .map(EntryInfo::file)
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
            let paths = self
                .all_paths()
                .await
                .map_err(|e| format!("Error: storage failure: {e}"))?;
            let mut matches = Vec::new();
            for path in paths {
                let Some(rel) = path.strip_prefix(&prefix) else {
                    continue;
                };
                if let Some(filter) = include
                    && !include_matches(filter, rel)
                {
                    continue;
                }
                let Ok(Some(file)) = self.load_file(&path).await else {
                    continue;
                };
                for (idx, line) in file.content.iter().enumerate() {
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
        Box::pin(async move {
            let key = self.todos_key();
            match self.store.get(&key).await {
                Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
                _ => Vec::new(),
            }
        })
    }

    fn set_todos(&self, todos: Vec<Todo>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let key = self.todos_key();
            if let Ok(raw) = serde_json::to_string(&todos) {
                if let Err(e) = self.store.set(&key, &raw).await {
                    tracing::warn!(error = %e, "failed to persist todos");
                }
            }
        })
    }

    fn export_state(&self) -> Pin<Box<dyn Future<Output = AgentState> + Send + '_>> {
        // File bodies already persist in the store; only todos ride the checkpoint.
        Box::pin(async move {
            AgentState {
                todos: self.get_todos().await,
                files: Default::default(),
            }
        })
    }

    fn import_state(&self, state: AgentState) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.set_todos(state.todos).await;
        })
    }
}
