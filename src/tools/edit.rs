//! 文件编辑工具 - 精确字符串替换
//!
//! old_string 必须在文件中唯一出现：零次或多次都拒绝，避免误改。

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::filesystem::SafeFs;
use crate::tools::{Tool, ToolResult};

pub struct EditFileTool {
    fs: SafeFs,
}

impl EditFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file (must match exactly once). Args: {\"path\": \"...\", \"old_string\": \"...\", \"new_string\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p,
            None => return ToolResult::fail("Missing required parameter: path"),
        };
        let old_string = match args.get("old_string").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s,
            _ => return ToolResult::fail("Missing required parameter: old_string"),
        };
        let new_string = args.get("new_string").and_then(|v| v.as_str()).unwrap_or("");

        let content = match self.fs.read_file(path) {
            Ok(c) => c,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        let matches = content.matches(old_string).count();
        if matches == 0 {
            return ToolResult::fail(format!("old_string not found in {}", path));
        }
        if matches > 1 {
            return ToolResult::fail(format!(
                "old_string occurs {} times in {}; provide more context to make it unique",
                matches, path
            ));
        }

        let updated = content.replacen(old_string, new_string, 1);
        let resolved = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        match std::fs::write(&resolved, &updated) {
            Ok(()) => {
                // 报告替换位置行号，便于核对
                let line = content[..content.find(old_string).unwrap_or(0)]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                ToolResult::ok_with_metadata(
                    format!("Replaced 1 occurrence in {} (line {})", path, line),
                    serde_json::json!({"line": line}),
                )
            }
            Err(e) => ToolResult::fail(format!("Write failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn edit(dir: &TempDir, args: Value) -> ToolResult {
        EditFileTool::new(dir.path()).execute(args).await
    }

    #[tokio::test]
    async fn test_unique_replace() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\ny = 2\n").unwrap();

        let result = edit(
            &dir,
            json!({"path": "a.py", "old_string": "y = 2", "new_string": "y = 3"}),
        )
        .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.output.contains("line 2"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "x = 1\ny = 3\n"
        );
    }

    #[tokio::test]
    async fn test_ambiguous_match_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\nx = 1\n").unwrap();

        let result = edit(
            &dir,
            json!({"path": "a.py", "old_string": "x = 1", "new_string": "x = 2"}),
        )
        .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("2 times"));
    }

    #[tokio::test]
    async fn test_not_found_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();

        let result = edit(
            &dir,
            json!({"path": "a.py", "old_string": "z = 9", "new_string": ""}),
        )
        .await;
        assert!(!result.success);
    }
}
