//! Git 工具集
//!
//! 只读：git_status / git_diff / git_log；写入：git_add / git_commit / git_push。
//! 统一经 run_git 执行，exit code 写入 metadata。强推等高危参数由风险层把关，
//! 这里只负责忠实执行与结果归一化。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolResult};

async fn run_git(project_root: &Path, args: &[&str]) -> ToolResult {
    let mut cmd = Command::new("git");
    cmd.args(args);
    cmd.current_dir(project_root);
    cmd.kill_on_drop(true);

    let output = match cmd.output().await {
        Ok(o) => o,
        Err(e) => return ToolResult::fail(format!("Failed to run git: {}", e)),
    };

    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    let exit_code = output.status.code().unwrap_or(-1);
    let metadata = serde_json::json!({"exit_code": exit_code});
    if output.status.success() {
        if text.trim().is_empty() {
            text = "(no output)".to_string();
        }
        ToolResult::ok_with_metadata(text, metadata)
    } else {
        ToolResult::fail_with_output(format!("git exited with {}", exit_code), text, metadata)
    }
}

macro_rules! git_tool {
    ($name:ident) => {
        pub struct $name {
            project_root: PathBuf,
        }

        impl $name {
            pub fn new(project_root: impl AsRef<Path>) -> Self {
                Self {
                    project_root: project_root.as_ref().to_path_buf(),
                }
            }
        }
    };
}

git_tool!(GitStatusTool);

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show working tree status. Args: {}"
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        run_git(&self.project_root, &["status", "--short", "--branch"]).await
    }
}

git_tool!(GitDiffTool);

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show changes. Args: {\"staged\": false, \"path\": \"optional/path\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let mut argv: Vec<&str> = vec!["diff"];
        if args.get("staged").and_then(|v| v.as_bool()).unwrap_or(false) {
            argv.push("--cached");
        }
        let path = args.get("path").and_then(|v| v.as_str());
        if let Some(p) = path {
            argv.push("--");
            argv.push(p);
        }
        run_git(&self.project_root, &argv).await
    }
}

git_tool!(GitLogTool);

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent commits. Args: {\"count\": 10}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let count = args.get("count").and_then(|v| v.as_u64()).unwrap_or(10).clamp(1, 100);
        let count_arg = format!("-{}", count);
        run_git(&self.project_root, &["log", "--oneline", &count_arg]).await
    }
}

git_tool!(GitAddTool);

#[async_trait]
impl Tool for GitAddTool {
    fn name(&self) -> &str {
        "git_add"
    }

    fn description(&self) -> &str {
        "Stage files. Args: {\"files\": [\"src/main.rs\"]} (defaults to all)"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let mut argv: Vec<String> = vec!["add".to_string()];
        match args.get("files").and_then(|v| v.as_array()) {
            Some(files) if !files.is_empty() => {
                argv.extend(files.iter().filter_map(|f| f.as_str().map(String::from)));
            }
            _ => argv.push(".".to_string()),
        }
        let argv_ref: Vec<&str> = argv.iter().map(|s| s.as_str()).collect();
        run_git(&self.project_root, &argv_ref).await
    }
}

git_tool!(GitCommitTool);

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Commit staged changes. Args: {\"message\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let message = match args.get("message").and_then(|v| v.as_str()) {
            Some(m) if !m.trim().is_empty() => m,
            _ => return ToolResult::fail("Missing required parameter: message"),
        };
        run_git(&self.project_root, &["commit", "-m", message]).await
    }
}

git_tool!(GitPushTool);

#[async_trait]
impl Tool for GitPushTool {
    fn name(&self) -> &str {
        "git_push"
    }

    fn description(&self) -> &str {
        "Push to a remote. Args: {\"remote\": \"origin\", \"branch\": \"...\", \"force\": false}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let remote = args.get("remote").and_then(|v| v.as_str()).unwrap_or("origin");
        let branch = args.get("branch").and_then(|v| v.as_str());
        let force = args.get("force").and_then(|v| v.as_bool()).unwrap_or(false);

        let mut argv: Vec<&str> = vec!["push"];
        if force {
            argv.push("--force-with-lease");
        }
        argv.push(remote);
        if let Some(b) = branch {
            argv.push(b);
        }
        run_git(&self.project_root, &argv).await
    }
}
