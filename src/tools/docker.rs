//! Docker 只读工具：容器列表与日志
//!
//! 写入类 docker 操作（run/rm/rmi）不提供专用工具，走 execute_command 并受风险层约束。

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolResult};

async fn run_docker(args: &[&str]) -> ToolResult {
    let mut cmd = Command::new("docker");
    cmd.args(args);
    cmd.kill_on_drop(true);

    let output = match cmd.output().await {
        Ok(o) => o,
        Err(e) => return ToolResult::fail(format!("Failed to run docker: {}", e)),
    };

    let text = String::from_utf8_lossy(&output.stdout).to_string();
    let exit_code = output.status.code().unwrap_or(-1);
    if output.status.success() {
        ToolResult::ok_with_metadata(text, serde_json::json!({"exit_code": exit_code}))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        ToolResult::fail_with_output(
            format!("docker exited with {}", exit_code),
            stderr,
            serde_json::json!({"exit_code": exit_code}),
        )
    }
}

#[derive(Default)]
pub struct DockerPsTool;

#[async_trait]
impl Tool for DockerPsTool {
    fn name(&self) -> &str {
        "docker_ps"
    }

    fn description(&self) -> &str {
        "List containers. Args: {\"all\": false}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let mut argv = vec!["ps"];
        if args.get("all").and_then(|v| v.as_bool()).unwrap_or(false) {
            argv.push("-a");
        }
        run_docker(&argv).await
    }
}

#[derive(Default)]
pub struct DockerLogsTool;

#[async_trait]
impl Tool for DockerLogsTool {
    fn name(&self) -> &str {
        "docker_logs"
    }

    fn description(&self) -> &str {
        "Show container logs. Args: {\"container\": \"name_or_id\", \"tail\": 100}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let container = match args.get("container").and_then(|v| v.as_str()) {
            Some(c) if !c.trim().is_empty() => c,
            _ => return ToolResult::fail("Missing required parameter: container"),
        };
        let tail = args.get("tail").and_then(|v| v.as_u64()).unwrap_or(100).clamp(1, 10_000);
        let tail_str = tail.to_string();
        run_docker(&["logs", "--tail", &tail_str, container]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_logs_requires_container() {
        let result = DockerLogsTool.execute(json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("container"));
    }
}
