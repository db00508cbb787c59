use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::state::{AgentState, FileData, Todo};
use crate::util::{normalize_path, normalize_prefix};

use super::{Backend, EntryInfo, GrepMatch, invalid_regex_error};

/// Backend routing operations by path prefix.
///
/// Constructed with a default backend plus mounts from prefix (ending in
/// `/`) to backend. Every operation picks the longest matching prefix; the
/// chosen backend receives the path with that prefix stripped (leading `/`
/// preserved), and returned paths get the prefix re-prepended so mounted
/// backends never leak their internal path space.
pub struct CompositeBackend {
    default: Arc<dyn Backend>,
    /// Sorted by prefix length, longest first.
    routes: Vec<(String, Arc<dyn Backend>)>,
}

impl CompositeBackend {
    pub fn new(default: Arc<dyn Backend>) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Register a backend under a path prefix. The prefix is normalized to
    /// start and end with `/`. Duplicate prefixes are disallowed.
    pub fn mount(mut self, prefix: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        let prefix = normalize_prefix(&prefix.into());
        assert_ne!(prefix, "/", "cannot mount at the root; use the default backend");
        assert!(
            !self.routes.iter().any(|(p, _)| *p == prefix),
            "duplicate mount prefix: {prefix}"
        );
        self.routes.push((prefix, backend));
        self.routes.sort_by_key(|(p, _)| std::cmp::Reverse(p.len()));
        self
    }

    /// Longest route matching `path`, with the prefix-stripped path.
    fn route_for_path(&self, path: &str) -> Option<(&Arc<dyn Backend>, String)> {
        self.routes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(prefix, backend)| (backend, path[prefix.len() - 1..].to_string()))
    }

    /// Longest route containing `prefix` (a normalized listing prefix),
    /// with the route-relative prefix.
    fn route_for_prefix(&self, prefix: &str) -> Option<(&str, &Arc<dyn Backend>, String)> {
        self.routes
            .iter()
            .find(|(route, _)| prefix.starts_with(route.as_str()))
            .map(|(route, backend)| {
                (
                    route.as_str(),
                    backend,
                    normalize_prefix(&prefix[route.len() - 1..]),
                )
            })
    }

    /// Re-prepend a route prefix to a path the mounted backend returned.
    fn rejoin(prefix: &str, inner: &str) -> String {
        format!("{}{}", &prefix[..prefix.len() - 1], inner)
    }
}

impl Backend for CompositeBackend {
    fn read_raw<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FileData>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path).map_err(Error::Backend)?;
            match self.route_for_path(&norm) {
                Some((backend, stripped)) => backend.read_raw(&stripped).await,
                None => self.default.read_raw(&norm).await,
            }
        })
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            let norm = normalize_path(path)?;
            match self.route_for_path(&norm) {
                Some((backend, stripped)) => {
                    let prefix = &norm[..norm.len() - stripped.len() + 1];
                    let inner = backend.write(&stripped, content).await?;
                    Ok(Self::rejoin(prefix, &inner))
                }
                None => self.default.write(&norm, content).await,
            }
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
            match self.route_for_path(&norm) {
                Some((backend, stripped)) => {
                    backend
                        .edit(&stripped, old_string, new_string, replace_all)
                        .await
                }
                None => {
                    self.default
                        .edit(&norm, old_string, new_string, replace_all)
                        .await
                }
            }
        })
    }

    fn ls_info<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = normalize_prefix(prefix);
            if prefix == "/" {
                // Default contents plus one synthetic dir per mount.
                let mut entries = self.default.ls_info("/").await;
                for (route, _) in &self.routes {
                    entries.push(EntryInfo::dir(route.clone()));
                }
                entries.sort_by(|a, b| a.path.cmp(&b.path));
                return entries;
            }
            match self.route_for_prefix(&prefix) {
                Some((route, backend, inner_prefix)) => backend
                    .ls_info(&inner_prefix)
                    .await
                    .into_iter()
                    .map(|mut e| {
                        e.path = Self::rejoin(route, &e.path);
                        e
                    })
                    .collect(),
                None => self.default.ls_info(&prefix).await,
            }
        })
    }

    fn glob_info<'a>(
        &'a self,
        pattern: &'a str,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>> {
        Box::pin(async move {
            let prefix = normalize_prefix(prefix);
            if prefix == "/" {
                let mut entries = self.default.glob_info(pattern, "/").await;
                for (route, backend) in &self.routes {
                    let mounted = backend.glob_info(pattern, "/").await;
                    entries.extend(mounted.into_iter().map(|mut e| {
                        e.path = Self::rejoin(route, &e.path);
                        e
                    }));
                }
                entries.sort_by(|a, b| a.path.cmp(&b.path));
                return entries;
            }
            match self.route_for_prefix(&prefix) {
                Some((route, backend, inner_prefix)) => backend
                    .glob_info(pattern, &inner_prefix)
                    .await
                    .into_iter()
                    .map(|mut e| {
                        e.path = Self::rejoin(route, &e.path);
                        e
                    })
                    .collect(),
                None => self.default.glob_info(pattern, &prefix).await,
            }
        })
    }

    fn grep_raw<'a>(
        &'a self,
        pattern: &'a str,
        prefix: &'a str,
        include: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<GrepMatch>, String>> + Send + 'a>> {
        Box::pin(async move {
            // Validate once so an invalid pattern fails identically
            // regardless of which backends would be consulted.
            regex::Regex::new(pattern).map_err(|e| invalid_regex_error(&e))?;
            let prefix = normalize_prefix(prefix);
            if prefix == "/" {
                let mut matches = self.default.grep_raw(pattern, "/", include).await?;
                for (route, backend) in &self.routes {
                    let mounted = backend.grep_raw(pattern, "/", include).await?;
                    matches.extend(mounted.into_iter().map(|mut m| {
                        m.path = Self::rejoin(route, &m.path);
                        m
                    }));
                }
                return Ok(matches);
            }
            match self.route_for_prefix(&prefix) {
                Some((route, backend, inner_prefix)) => Ok(backend
                    .grep_raw(pattern, &inner_prefix, include)
                    .await?
                    .into_iter()
                    .map(|mut m| {
                        m.path = Self::rejoin(route, &m.path);
                        m
                    })
                    .collect()),
                None => self.default.grep_raw(pattern, &prefix, include).await,
            }
        })
    }

    fn get_todos(&self) -> Pin<Box<dyn Future<Output = Vec<Todo>> + Send + '_>> {
        self.default.get_todos()
    }

    fn set_todos(&self, todos: Vec<Todo>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.default.set_todos(todos)
    }

    fn export_state(&self) -> Pin<Box<dyn Future<Output = AgentState> + Send + '_>> {
        self.default.export_state()
    }

    fn import_state(&self, state: AgentState) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.default.import_state(state)
    }
}
