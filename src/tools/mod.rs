//! 工具箱：注册表、派发器与具体工具实现
//!
//! 副作用只发生在工具内部；派发器负责查找、超时与审计，风险层负责门控。

pub mod dispatcher;
pub mod docker;
pub mod edit;
pub mod filesystem;
pub mod git;
pub mod http;
pub mod registry;
pub mod search;
pub mod shell;
pub mod tree;

use std::path::Path;

pub use dispatcher::{ToolDispatcher, TRUNCATION_MARKER};
pub use docker::{DockerLogsTool, DockerPsTool};
pub use edit::EditFileTool;
pub use filesystem::{ListFilesTool, ReadFileTool, SafeFs, WriteFileTool};
pub use git::{GitAddTool, GitCommitTool, GitDiffTool, GitLogTool, GitPushTool, GitStatusTool};
pub use http::HttpRequestTool;
pub use registry::{Tool, ToolRegistry, ToolResult};
pub use search::SearchFilesTool;
pub use shell::ExecuteCommandTool;
pub use tree::FileTreeTool;

use crate::config::ToolsSection;

/// 装配默认工具箱：文件系统、搜索、shell、git、docker、http
pub fn default_registry(workspace_root: impl AsRef<Path>, cfg: &ToolsSection) -> ToolRegistry {
    let root = workspace_root.as_ref();
    let mut registry = ToolRegistry::new();

    registry.register(ReadFileTool::new(root));
    registry.register(WriteFileTool::new(root));
    registry.register(EditFileTool::new(root));
    registry.register(ListFilesTool::new(root));
    registry.register(FileTreeTool::new(root));
    registry.register(SearchFilesTool::new(root));
    registry.register(ExecuteCommandTool::new(cfg.allowed_commands.clone(), root));
    registry.register(GitStatusTool::new(root));
    registry.register(GitDiffTool::new(root));
    registry.register(GitLogTool::new(root));
    registry.register(GitAddTool::new(root));
    registry.register(GitCommitTool::new(root));
    registry.register(GitPushTool::new(root));
    registry.register(DockerPsTool);
    registry.register(DockerLogsTool);
    registry.register(HttpRequestTool::new(
        cfg.allowed_domains.clone(),
        cfg.max_output_chars,
    ));

    registry
}
