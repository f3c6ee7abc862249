//! Shell 执行器：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、cargo）；禁止 rm -rf、管道拉起脚本等子串；
//! 执行通过 sh -c / cmd /C，stdout 与 stderr 合并，exit code 写入 metadata。
//! 超时由派发器负责；future 被丢弃时子进程随之终止（kill_on_drop）。

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolResult};

/// 禁止的命令/子串（即使白名单中有同名命令，带这些参数也不允许）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "curl | sh",
    "curl|sh",
    "wget | sh",
    "chmod 777 /",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

/// execute_command 工具：仅允许白名单内命令
pub struct ExecuteCommandTool {
    allowed_commands: HashSet<String>,
    working_dir: PathBuf,
}

impl ExecuteCommandTool {
    pub fn new(allowed_commands: Vec<String>, working_dir: impl AsRef<Path>) -> Self {
        let allowed_commands = allowed_commands.into_iter().map(|s| s.to_lowercase()).collect();
        Self {
            allowed_commands,
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// 只取第一个 token 作为命令名
    fn command_name<'a>(&self, raw: &'a str) -> &'a str {
        raw.split_whitespace().next().unwrap_or("")
    }

    fn is_allowed(&self, raw: &str) -> Result<(), String> {
        let raw_lower = raw.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if raw_lower.contains(forbidden) {
                return Err(format!("Forbidden pattern: {}", forbidden));
            }
        }
        let name = self.command_name(&raw_lower);
        if name.is_empty() {
            return Err("Empty command".to_string());
        }
        if self.allowed_commands.contains(name) {
            return Ok(());
        }
        Err(format!("Command '{}' not in allowlist", name))
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "execute_command"
    }

    fn description(&self) -> &str {
        "Run a whitelisted shell command in the workspace. Args: {\"command\": \"cargo test\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let command = match args.get("command").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::fail("Missing required parameter: command"),
        };

        if let Err(reason) = self.is_allowed(command) {
            return ToolResult::fail(reason);
        }

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        cmd.current_dir(&self.working_dir);
        // 取消/超时丢弃 future 时，子进程必须随之被杀掉
        cmd.kill_on_drop(true);

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) => return ToolResult::fail(format!("Spawn failed: {}", e)),
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
            ToolResult::ok_with_metadata(text, metadata)
        } else {
            ToolResult::fail_with_output(format!("exit code {}", exit_code), text, metadata)
        }
    }
}
