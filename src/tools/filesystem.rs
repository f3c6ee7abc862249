//! 沙箱文件系统工具
//!
//! SafeFs 绑定 root_dir，所有路径校验必须在 root 下（禁止 ../ 逃逸与外部绝对路径）；
//! read_file / write_file / list_files 基于 SafeFs 实现。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::{Tool, ToolResult};

/// 沙箱文件系统：绑定根目录，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 词法校验：拒绝 .. 分量；绝对路径必须以 root 开头
    fn check_lexical(&self, path: &str) -> Result<PathBuf, AgentError> {
        let p = Path::new(path);
        if p.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(AgentError::PathEscape(path.to_string()));
        }
        if p.is_absolute() {
            if p.starts_with(&self.root_dir) {
                Ok(p.to_path_buf())
            } else {
                Err(AgentError::PathEscape(path.to_string()))
            }
        } else {
            Ok(self.root_dir.join(p.strip_prefix("./").unwrap_or(p)))
        }
    }

    /// 解析已存在的路径；符号链接解析后仍须在 root 下
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let full = self.check_lexical(path)?;
        let canonical = full
            .canonicalize()
            .map_err(|_| AgentError::ToolExecutionFailed(format!("Path not found: {}", path)))?;
        if canonical.starts_with(&self.root_dir) {
            Ok(canonical)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    /// 解析写入目标：文件可以不存在，父目录按需创建
    pub fn resolve_for_write(&self, path: &str) -> Result<PathBuf, AgentError> {
        let full = self.check_lexical(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AgentError::ToolExecutionFailed(format!("mkdir failed: {}", e)))?;
        }
        Ok(full)
    }

    pub fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {}", e)))
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, AgentError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let mut entries = Vec::new();
        let read = std::fs::read_dir(&base)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("List failed: {}", e)))?;
        for e in read {
            let e = e.map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
            let name = e.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let suffix = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            entries.push(format!("{}{}", name, suffix));
        }
        entries.sort();
        Ok(entries)
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing required parameter: {}", key))
}

/// 读取文件内容
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read file contents. Args: {\"path\": \"file path relative to workspace\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match required_str(&args, "path") {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };
        match self.fs.read_file(path) {
            Ok(content) => {
                let lines = content.lines().count();
                ToolResult::ok_with_metadata(content, serde_json::json!({"lines": lines}))
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

/// 写入（覆盖）文件
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file. Args: {\"path\": \"...\", \"content\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = match required_str(&args, "path") {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e),
        };
        let content = args.get("content").and_then(|v| v.as_str()).unwrap_or("");
        let resolved = match self.fs.resolve_for_write(path) {
            Ok(p) => p,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        match std::fs::write(&resolved, content) {
            Ok(()) => ToolResult::ok(format!("Wrote {} bytes to {}", content.len(), path)),
            Err(e) => ToolResult::fail(format!("Write failed: {}", e)),
        }
    }
}

/// 列出目录
pub struct ListFilesTool {
    fs: SafeFs,
}

impl ListFilesTool {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List a directory (non-recursive). Args: {\"path\": \".\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        match self.fs.list_dir(path) {
            Ok(entries) if entries.is_empty() => ToolResult::ok("(empty)"),
            Ok(entries) => {
                let count = entries.len();
                ToolResult::ok_with_metadata(entries.join("\n"), serde_json::json!({"entries": count}))
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parent_dir_escape_rejected() {
        let dir = TempDir::new().unwrap();
        let fs = SafeFs::new(dir.path());
        assert!(matches!(
            fs.resolve("../../etc/passwd"),
            Err(AgentError::PathEscape(_))
        ));
    }

    #[test]
    fn test_absolute_path_outside_root_rejected() {
        let dir = TempDir::new().unwrap();
        let fs = SafeFs::new(dir.path());
        assert!(matches!(
            fs.resolve_for_write("/etc/passwd"),
            Err(AgentError::PathEscape(_))
        ));
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let write = WriteFileTool::new(dir.path());
        let read = ReadFileTool::new(dir.path());

        let result = write
            .execute(json!({"path": "sub/a.txt", "content": "hello"}))
            .await;
        assert!(result.success, "{:?}", result.error);

        let result = read.execute(json!({"path": "sub/a.txt"})).await;
        assert!(result.success);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn test_read_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let read = ReadFileTool::new(dir.path());
        let result = read.execute(json!({"path": "nope.txt"})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_list_hides_dotfiles() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let list = ListFilesTool::new(dir.path());
        let result = list.execute(json!({"path": "."})).await;
        assert!(result.success);
        assert!(result.output.contains("a.txt"));
        assert!(result.output.contains("sub/"));
        assert!(!result.output.contains(".hidden"));
    }

    #[tokio::test]
    async fn test_missing_path_param() {
        let dir = TempDir::new().unwrap();
        let read = ReadFileTool::new(dir.path());
        let result = read.execute(json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("path"));
    }
}
