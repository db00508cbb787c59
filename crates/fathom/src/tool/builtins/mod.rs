mod edit;
mod execute;
mod glob;
mod grep;
mod http;
mod ls;
mod read;
mod task;
mod todos;
mod webfetch;
mod websearch;
mod write;

use std::sync::Arc;

use crate::backend::Backend;
use crate::tool::Tool;

pub use edit::EditFileTool;
pub use execute::{ExecResult, ExecuteTool, ProcessSandbox, Sandbox};
pub use glob::GlobTool;
pub use grep::GrepTool;
pub use http::HttpRequestTool;
pub use ls::LsTool;
pub use read::ReadFileTool;
pub use task::TaskTool;
pub use todos::WriteTodosTool;
pub use webfetch::FetchUrlTool;
pub use websearch::{SearchResult, WebSearchProvider, WebSearchTool};
pub use write::WriteFileTool;

/// Create the core filesystem + planning tools over a shared backend.
///
/// The `task`, `execute`, and web tools are added separately by the agent
/// builder when their collaborators (sub-agent configs, sandbox, search
/// provider) are supplied.
pub fn builtin_tools(backend: Arc<dyn Backend>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(WriteTodosTool::new(backend.clone())),
        Arc::new(LsTool::new(backend.clone())),
        Arc::new(ReadFileTool::new(backend.clone())),
        Arc::new(write::WriteFileTool::new(backend.clone())),
        Arc::new(EditFileTool::new(backend.clone())),
        Arc::new(GlobTool::new(backend.clone())),
        Arc::new(GrepTool::new(backend)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::state::StateBackend;

    #[test]
    fn builtin_tools_cover_core_set() {
        let backend: Arc<dyn Backend> = Arc::new(StateBackend::new());
        let tools = builtin_tools(backend);
        let names: Vec<String> = tools.iter().map(|t| t.definition().name).collect();
        assert_eq!(
            names,
            vec![
                "write_todos",
                "ls",
                "read_file",
                "write_file",
                "edit_file",
                "glob",
                "grep"
            ]
        );
    }
}
