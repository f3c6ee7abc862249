//! 目录树工具
//!
//! walkdir 遍历，深度与条数双上限；超限截断并追加显式标记，
//! 探索阶段据此收窄下一次调用的参数。

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use crate::tools::dispatcher::TRUNCATION_MARKER;
use crate::tools::filesystem::SafeFs;
use crate::tools::{Tool, ToolResult};

/// 单次输出的条数上限
const MAX_ENTRIES: usize = 200;

pub struct FileTreeTool {
    fs: SafeFs,
}

impl FileTreeTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for FileTreeTool {
    fn name(&self) -> &str {
        "file_tree"
    }

    fn description(&self) -> &str {
        "Show the directory tree. Args: {\"path\": \".\", \"max_depth\": 3}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let max_depth = args
            .get("max_depth")
            .and_then(|v| v.as_u64())
            .unwrap_or(3)
            .clamp(1, 10) as usize;

        let base = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        let mut lines = Vec::new();
        let mut truncated = false;
        for entry in WalkDir::new(&base)
            .max_depth(max_depth)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            // depth 0 是遍历根，不受隐藏名过滤影响
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if lines.len() >= MAX_ENTRIES {
                truncated = true;
                break;
            }
            let depth = entry.depth();
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            lines.push(format!(
                "{}{}{}",
                "  ".repeat(depth.saturating_sub(1)),
                entry.file_name().to_string_lossy(),
                suffix
            ));
        }

        let mut output = lines.join("\n");
        if truncated {
            output.push('\n');
            output.push_str(TRUNCATION_MARKER);
        }
        if output.is_empty() {
            output = "(empty)".to_string();
        }
        ToolResult::ok_with_metadata(
            output,
            serde_json::json!({"entries": lines.len(), "truncated": truncated}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_tree_respects_depth() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/deep.txt"), "x").unwrap();
        std::fs::write(dir.path().join("top.txt"), "x").unwrap();

        let tool = FileTreeTool::new(dir.path());
        let result = tool.execute(json!({"path": ".", "max_depth": 1})).await;
        assert!(result.success);
        assert!(result.output.contains("top.txt"));
        assert!(!result.output.contains("deep.txt"));
    }

    #[tokio::test]
    async fn test_tree_truncates_large_dirs() {
        let dir = TempDir::new().unwrap();
        for i in 0..(MAX_ENTRIES + 50) {
            std::fs::write(dir.path().join(format!("f{:04}.txt", i)), "x").unwrap();
        }
        let tool = FileTreeTool::new(dir.path());
        let result = tool.execute(json!({"path": "."})).await;
        assert!(result.success);
        assert!(result.output.contains(TRUNCATION_MARKER));
        assert_eq!(result.metadata["truncated"], serde_json::json!(true));
    }
}
