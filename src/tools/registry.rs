//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找。
//! 工具自身的失败表达在 ToolResult.success 里；超时与未知工具由派发器负责。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 一次工具调用的归一化结果
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// 工具自述的附加信息（如 exit_code、matches）
    pub metadata: Value,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            metadata: Value::Null,
        }
    }

    pub fn ok_with_metadata(output: impl Into<String>, metadata: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            metadata,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            metadata: Value::Null,
        }
    }

    pub fn fail_with_output(error: impl Into<String>, output: impl Into<String>, metadata: Value) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(error.into()),
            metadata,
        }
    }

    /// 喂给 Oracle / 观察日志的内容：失败时优先错误文本
    pub fn render(&self) -> &str {
        match (&self.error, self.output.is_empty()) {
            (Some(error), true) => error,
            _ => &self.output,
        }
    }
}

/// 工具 trait：名称、描述（供 Oracle 理解参数格式）、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划步骤中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（含参数说明，进入提示词）
    fn description(&self) -> &str;

    async fn execute(&self, args: Value) -> ToolResult;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 提示词中的 Available tools 段落；filter 为 None 时列出全部
    pub fn descriptions_text(&self, filter: Option<&dyn Fn(&str) -> bool>) -> String {
        let mut names = self.tool_names();
        if let Some(pred) = filter {
            names.retain(|n| pred(n));
        }
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| format!("- {}: {}", tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo back the text. Args: {\"text\": \"...\"}"
        }

        async fn execute(&self, args: Value) -> ToolResult {
            match args.get("text").and_then(|v| v.as_str()) {
                Some(text) => ToolResult::ok(text),
                None => ToolResult::fail("missing text"),
            }
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let tool = registry.get("echo").expect("registered");
        let result = tool.execute(serde_json::json!({"text": "hi"})).await;
        assert!(result.success);
        assert_eq!(result.output, "hi");
    }

    #[test]
    fn test_descriptions_filtered() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let all = registry.descriptions_text(None);
        assert!(all.contains("echo:"));
        let none = registry.descriptions_text(Some(&|name: &str| name != "echo"));
        assert!(none.is_empty());
    }

    #[test]
    fn test_render_prefers_error_when_no_output() {
        let result = ToolResult::fail("boom");
        assert_eq!(result.render(), "boom");
        let result = ToolResult::fail_with_output("exit 1", "partial logs", Value::Null);
        assert_eq!(result.render(), "partial logs");
    }
}
