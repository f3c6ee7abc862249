//! 工具派发器
//!
//! execute(tool, params, timeout) 查注册表、加超时、统一截断过长输出，
//! 并输出一行结构化审计日志（JSON）。派发器自身不做任何 I/O，
//! 副作用全部发生在被查出的工具实现内部；重试策略归调用方。

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::core::AgentError;
use crate::tools::{ToolRegistry, ToolResult};

/// 截断标记：探索阶段的 looks_truncated 依赖该文本
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// 工具派发器：注册表查找 + 超时 + 审计
pub struct ToolDispatcher {
    registry: ToolRegistry,
    default_timeout: Duration,
    max_output_chars: usize,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64, max_output_chars: usize) -> Self {
        Self {
            registry,
            default_timeout: Duration::from_secs(timeout_secs),
            max_output_chars,
        }
    }

    /// 执行指定工具；未知工具与超时为类型化错误，工具级失败留在 ToolResult 里
    pub async fn execute(
        &self,
        tool_name: &str,
        params: &Value,
        timeout: Option<Duration>,
    ) -> Result<ToolResult, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let start = Instant::now();
        let effective = timeout.unwrap_or(self.default_timeout);

        let result = tokio::time::timeout(effective, tool.execute(params.clone())).await;

        let outcome = match &result {
            Ok(r) if r.success => "ok",
            Ok(_) => "error",
            Err(_) => "timeout",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview(params),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(mut tool_result) => {
                self.truncate(&mut tool_result);
                Ok(tool_result)
            }
            // 超时不在此处重试：只有调用方知道该步骤重试是否安全
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 过长输出统一截断并追加显式标记
    fn truncate(&self, result: &mut ToolResult) {
        if result.output.chars().count() > self.max_output_chars {
            let mut cut: String = result.output.chars().take(self.max_output_chars).collect();
            cut.push('\n');
            cut.push_str(TRUNCATION_MARKER);
            result.output = cut;
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn descriptions_text(&self, filter: Option<&dyn Fn(&str) -> bool>) -> String {
        self.registry.descriptions_text(filter)
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "sleeps for a while"
        }

        async fn execute(&self, _args: Value) -> ToolResult {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ToolResult::ok("woke up")
        }
    }

    struct BigOutputTool;

    #[async_trait]
    impl Tool for BigOutputTool {
        fn name(&self) -> &str {
            "big"
        }

        fn description(&self) -> &str {
            "returns a large output"
        }

        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok("x".repeat(10_000))
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(SleepyTool);
        registry.register(BigOutputTool);
        ToolDispatcher::new(registry, 60, 1000)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let d = dispatcher();
        let err = d.execute("missing", &Value::Null, None).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_timeout_without_retry() {
        let d = dispatcher();
        let err = d
            .execute("sleepy", &Value::Null, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(_)));
    }

    #[tokio::test]
    async fn test_long_output_truncated_with_marker() {
        let d = dispatcher();
        let result = d.execute("big", &Value::Null, None).await.unwrap();
        assert!(result.output.ends_with(TRUNCATION_MARKER));
        assert!(result.output.chars().count() <= 1000 + TRUNCATION_MARKER.len() + 1);
    }
}
