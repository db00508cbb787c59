use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single todo entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// One entry in the agent's planning list.
///
/// Ids are unique within a list. At most one `InProgress` entry at a time
/// is a convention the model is prompted toward, not an enforced invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
}

/// A file in the virtual filesystem: one string per logical line plus
/// creation/modification timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub content: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl FileData {
    /// Build from raw text. Splits on `\n` (not `lines()`) so that joining
    /// the lines back with `\n` round-trips byte-for-byte, including
    /// trailing newlines.
    pub fn new(text: &str) -> Self {
        let now = Utc::now();
        Self {
            content: text.split('\n').map(String::from).collect(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Reassemble the file text by newline join.
    pub fn text(&self) -> String {
        self.content.join("\n")
    }

    /// Replace the content, preserving `created_at` and refreshing
    /// `modified_at`.
    pub fn set_text(&mut self, text: &str) {
        self.content = text.split('\n').map(String::from).collect();
        self.modified_at = Utc::now();
    }

    /// True when the file has no content at all (a single empty line).
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() || (self.content.len() == 1 && self.content[0].is_empty())
    }
}

/// The full mutable state of an agent run: the todo list plus the virtual
/// file map. Paths are opaque strings beginning with `/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default)]
    pub todos: Vec<Todo>,
    #[serde(default)]
    pub files: BTreeMap<String, FileData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_data_roundtrips_text() {
        let data = FileData::new("line one\nline two\nline three");
        assert_eq!(data.content.len(), 3);
        assert_eq!(data.text(), "line one\nline two\nline three");
    }

    #[test]
    fn file_data_preserves_trailing_newline() {
        let data = FileData::new("line one\n");
        assert_eq!(data.content, vec!["line one".to_string(), String::new()]);
        assert_eq!(data.text(), "line one\n");
    }

    #[test]
    fn file_data_empty() {
        let data = FileData::new("");
        assert!(data.is_empty());
        assert_eq!(data.text(), "");
    }

    #[test]
    fn file_data_set_text_keeps_created_at() {
        let mut data = FileData::new("original");
        let created = data.created_at;
        data.set_text("replaced");
        assert_eq!(data.created_at, created);
        assert!(data.modified_at >= created);
        assert_eq!(data.text(), "replaced");
    }

    #[test]
    fn todo_serializes_snake_case_status() {
        let todo = Todo {
            id: "1".into(),
            content: "write tests".into(),
            status: TodoStatus::InProgress,
        };
        let json = serde_json::to_string(&todo).unwrap();
        assert!(json.contains(r#""status":"in_progress""#), "json: {json}");
        let back: Todo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, todo);
    }

    #[test]
    fn agent_state_roundtrips_through_json() {
        let mut state = AgentState::default();
        state.todos.push(Todo {
            id: "a".into(),
            content: "plan".into(),
            status: TodoStatus::Pending,
        });
        state.files.insert("/notes.md".into(), FileData::new("hello"));

        let json = serde_json::to_string(&state).unwrap();
        let back: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn agent_state_default_is_empty() {
        let state: AgentState = serde_json::from_str("{}").unwrap();
        assert!(state.todos.is_empty());
        assert!(state.files.is_empty());
    }
}
