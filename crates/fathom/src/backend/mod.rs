pub mod composite;
pub mod disk;
pub mod kv;
pub mod state;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::state::{AgentState, FileData, Todo};
use crate::util::{normalize_path, render_read};

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry returned by `ls_info` / `glob_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub path: String,
    pub kind: EntryKind,
}

impl EntryInfo {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Dir,
        }
    }
}

/// One grep hit: path, 1-based line number, matching line text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrepMatch {
    pub path: String,
    pub line: usize,
    pub text: String,
}

pub(crate) fn not_found_error(path: &str) -> String {
    format!("Error: File '{path}' not found")
}

pub(crate) fn overwrite_error(path: &str) -> String {
    format!(
        "Error: File '{path}' already exists. Read it first and use edit_file to modify it."
    )
}

pub(crate) fn occurrence_error(count: usize) -> String {
    format!(
        "Error: String appears {count} times in the file. Provide more surrounding context to \
         make it unique, or set replace_all."
    )
}

pub(crate) fn invalid_regex_error(err: &regex::Error) -> String {
    format!("Invalid regex pattern: {err}")
}

/// Literal substring replacement shared by every backend. Returns the new
/// text and the number of occurrences replaced.
pub(crate) fn apply_edit(
    text: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> Result<(String, usize), String> {
    if old_string.is_empty() {
        return Err("Error: old_string cannot be empty".to_string());
    }
    let count = text.matches(old_string).count();
    if count == 0 {
        return Err(
            "Error: String not found in file. Make sure old_string matches exactly, including \
             whitespace and indentation."
                .to_string(),
        );
    }
    if count > 1 && !replace_all {
        return Err(occurrence_error(count));
    }
    if replace_all {
        Ok((text.replace(old_string, new_string), count))
    } else {
        // count == 1 was verified above
        Ok((text.replacen(old_string, new_string, 1), 1))
    }
}

/// Storage layer behind the virtual filesystem and the todo list.
///
/// All operations are asynchronous contracts (`Pin<Box<dyn Future>>` for
/// dyn-compatibility) even where an implementation is synchronous in effect.
/// User-input failures (missing file, ambiguous edit) travel as `Err(String)`
/// or error-prefixed strings, never as [`Error`]. That type is reserved for
/// operational failures.
pub trait Backend: Send + Sync {
    /// Formatted line-addressed read. `offset` is 0-based; each rendered
    /// line carries a right-aligned width-6 number and a tab. Provided in
    /// terms of `read_raw`, which already accounts for backend-specific
    /// timestamps.
    fn read<'a>(
        &'a self,
        path: &'a str,
        offset: usize,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = String> + Send + 'a>> {
        Box::pin(async move {
            let norm = match normalize_path(path) {
                Ok(p) => p,
                Err(e) => return e,
            };
            match self.read_raw(&norm).await {
                Err(e) => format!("Error: {e}"),
                Ok(None) => not_found_error(&norm),
                Ok(Some(data)) => render_read(&data, offset, limit),
            }
        })
    }

    /// Raw file lookup. `Ok(None)` when the path does not exist.
    fn read_raw<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<FileData>, Error>> + Send + 'a>>;

    /// Create a file. Returns the normalized path on success. The default
    /// policy rejects overwriting an existing path; backends constructed
    /// overwrite-capable preserve the original `created_at` instead.
    fn write<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

    /// Literal (non-regex) substring replacement. Returns the number of
    /// occurrences replaced. Zero matches fails; multiple matches fail
    /// unless `replace_all` is set.
    fn edit<'a>(
        &'a self,
        path: &'a str,
        old_string: &'a str,
        new_string: &'a str,
        replace_all: bool,
    ) -> Pin<Box<dyn Future<Output = Result<usize, String>> + Send + 'a>>;

    /// List entries directly under `prefix`.
    fn ls_info<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>>;

    /// Files under `prefix` whose prefix-relative path matches the glob.
    fn glob_info<'a>(
        &'a self,
        pattern: &'a str,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = Vec<EntryInfo>> + Send + 'a>>;

    /// Regex search across files under `prefix`. Invalid patterns return
    /// `Err("Invalid regex pattern: ...")`; no matches returns an empty vec.
    fn grep_raw<'a>(
        &'a self,
        pattern: &'a str,
        prefix: &'a str,
        include: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<GrepMatch>, String>> + Send + 'a>>;

    fn get_todos(&self) -> Pin<Box<dyn Future<Output = Vec<Todo>> + Send + '_>>;

    fn set_todos(&self, todos: Vec<Todo>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Snapshot for checkpointing. Backends whose file bodies persist
    /// outside the checkpoint (disk, key-value) export todos only.
    fn export_state(&self) -> Pin<Box<dyn Future<Output = AgentState> + Send + '_>>;

    /// Restore a checkpointed snapshot.
    fn import_state(&self, state: AgentState) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_strings_have_contract_shapes() {
        assert_eq!(
            not_found_error("/missing.txt"),
            "Error: File '/missing.txt' not found"
        );
        assert!(overwrite_error("/x").starts_with("Error: File '/x' already exists"));
        assert!(occurrence_error(2).contains("appears 2 times"));
        let err = regex::Regex::new("[invalid").unwrap_err();
        assert!(invalid_regex_error(&err).starts_with("Invalid regex pattern:"));
    }

    #[test]
    fn entry_info_constructors() {
        assert_eq!(EntryInfo::file("/a").kind, EntryKind::File);
        assert_eq!(EntryInfo::dir("/b/").kind, EntryKind::Dir);
    }

    #[test]
    fn apply_edit_single_occurrence() {
        let (text, count) = apply_edit("hello world", "world", "rust", false).unwrap();
        assert_eq!(text, "hello rust");
        assert_eq!(count, 1);
    }

    #[test]
    fn apply_edit_rejects_ambiguous_match() {
        let err = apply_edit("a b a", "a", "c", false).unwrap_err();
        assert!(err.contains("appears 2 times"), "got: {err}");
    }

    #[test]
    fn apply_edit_replace_all() {
        let (text, count) = apply_edit("a b a", "a", "c", true).unwrap();
        assert_eq!(text, "c b c");
        assert_eq!(count, 2);
    }

    #[test]
    fn apply_edit_rejects_missing_string() {
        let err = apply_edit("hello", "xyz", "abc", false).unwrap_err();
        assert!(err.contains("String not found"), "got: {err}");
    }

    #[test]
    fn apply_edit_rejects_empty_old_string() {
        assert!(apply_edit("hello", "", "x", false).is_err());
    }
}
