//! 代码搜索工具
//!
//! 正则匹配文件内容，glob 过滤文件名；结果条数有上限，超限追加截断标记。

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use walkdir::WalkDir;

use crate::tools::dispatcher::TRUNCATION_MARKER;
use crate::tools::filesystem::SafeFs;
use crate::tools::{Tool, ToolResult};

/// 默认结果条数上限（可由 max_results 参数收窄）
const DEFAULT_MAX_RESULTS: usize = 50;
/// 跳过超过该大小的文件（二进制/生成物）
const MAX_FILE_BYTES: u64 = 1024 * 1024;

pub struct SearchFilesTool {
    fs: SafeFs,
}

impl SearchFilesTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Search file contents with a regex. Args: {\"pattern\": \"fn main\", \"path\": \".\", \"glob\": \"*.rs\", \"max_results\": 50}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let pattern = match args.get("pattern").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p,
            _ => return ToolResult::fail("Missing required parameter: pattern"),
        };
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let glob_filter = args.get("glob").and_then(|v| v.as_str());
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, 500);

        let re = match regex::Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => return ToolResult::fail(format!("Invalid regex: {}", e)),
        };
        let name_matcher = match glob_filter.map(glob::Pattern::new) {
            Some(Ok(p)) => Some(p),
            Some(Err(e)) => return ToolResult::fail(format!("Invalid glob: {}", e)),
            None => None,
        };

        let base = match self.fs.resolve(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };

        let mut hits = Vec::new();
        let mut truncated = false;
        'files: for entry in WalkDir::new(&base)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if let Some(matcher) = &name_matcher {
                if !matcher.matches(&entry.file_name().to_string_lossy()) {
                    continue;
                }
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue;
            };
            let rel = entry
                .path()
                .strip_prefix(self.fs.root())
                .unwrap_or(entry.path())
                .display();
            let rel = rel.to_string();
            for (lineno, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    if hits.len() >= max_results {
                        truncated = true;
                        break 'files;
                    }
                    let shown: String = line.trim().chars().take(200).collect();
                    hits.push(format!("{}:{}: {}", rel, lineno + 1, shown));
                }
            }
        }

        if hits.is_empty() {
            return ToolResult::ok("No matches found.");
        }
        let mut output = hits.join("\n");
        if truncated {
            output.push('\n');
            output.push_str(TRUNCATION_MARKER);
        }
        ToolResult::ok_with_metadata(
            output,
            serde_json::json!({"matches": hits.len(), "truncated": truncated}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_search_with_glob() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "fn main in text\n").unwrap();

        let tool = SearchFilesTool::new(dir.path());
        let result = tool
            .execute(json!({"pattern": "fn main", "glob": "*.rs"}))
            .await;
        assert!(result.success);
        assert!(result.output.contains("a.rs:1:"));
        assert!(!result.output.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_search_caps_results() {
        let dir = TempDir::new().unwrap();
        let body = "match me\n".repeat(20);
        std::fs::write(dir.path().join("big.txt"), body).unwrap();

        let tool = SearchFilesTool::new(dir.path());
        let result = tool
            .execute(json!({"pattern": "match me", "max_results": 5}))
            .await;
        assert!(result.success);
        assert!(result.output.contains(TRUNCATION_MARKER));
        assert_eq!(result.metadata["matches"], serde_json::json!(5));
    }

    #[tokio::test]
    async fn test_no_matches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "nothing here\n").unwrap();
        let tool = SearchFilesTool::new(dir.path());
        let result = tool.execute(json!({"pattern": "absent_symbol"})).await;
        assert!(result.success);
        assert!(result.output.contains("No matches"));
    }

    #[tokio::test]
    async fn test_invalid_regex() {
        let dir = TempDir::new().unwrap();
        let tool = SearchFilesTool::new(dir.path());
        let result = tool.execute(json!({"pattern": "(["})).await;
        assert!(!result.success);
    }
}
