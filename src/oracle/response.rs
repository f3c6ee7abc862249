//! Oracle 响应：封闭的标签变体集合 + 边界校验
//!
//! 外部文本永远先解析成这里的枚举再驱动控制流；解析失败是可重试错误，
//! 不是崩溃。JSON 提取兼容 ```json 围栏与裸大括号两种形式。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::core::{AgentError, TaskMode};
use crate::plan::{Plan, Step};

/// 任务分析结果（Analyzing 阶段）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TaskAnalysis {
    /// trivial | simple | medium | complex
    pub complexity: String,
    /// low | medium | high
    pub uncertainty: String,
    pub estimated_steps: u32,
    /// fast | hybrid | exploratory
    pub mode: String,
    pub reasoning: String,
}

impl Default for TaskAnalysis {
    fn default() -> Self {
        Self {
            complexity: "medium".to_string(),
            uncertainty: "medium".to_string(),
            estimated_steps: 4,
            mode: "hybrid".to_string(),
            reasoning: String::new(),
        }
    }
}

impl TaskAnalysis {
    pub fn recommended_mode(&self) -> TaskMode {
        TaskMode::parse(&self.mode)
    }
}

/// 探索阶段的一次工具调用建议
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExploreAction {
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub reasoning: String,
}

/// Oracle 的全部合法响应变体；未知 type 即格式错误
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleResponse {
    Analysis(TaskAnalysis),
    Plan(Plan),
    Explore(ExploreAction),
    /// 探索信息已足够，提前结束
    FindingsSufficient {
        #[serde(default)]
        summary: String,
    },
    /// 重规划：替换未执行的计划尾部
    Replan {
        steps: Vec<Step>,
    },
}

/// 从自由文本中提取 JSON 块：优先 ```json 围栏，其次首个大括号跨度
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let inner = match rest.find("```") {
            Some(end) => &rest[..end],
            None => rest,
        };
        return Some(inner.trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        Some(&trimmed[start..=end])
    } else {
        None
    }
}

/// 解析并校验一次 Oracle 输出
pub fn parse_response(raw: &str) -> Result<OracleResponse, AgentError> {
    let json_str = extract_json(raw).ok_or_else(|| AgentError::OracleMalformed {
        reason: "no JSON object found".to_string(),
        raw: raw.to_string(),
    })?;

    let response: OracleResponse =
        serde_json::from_str(json_str).map_err(|e| AgentError::OracleMalformed {
            reason: e.to_string(),
            raw: raw.to_string(),
        })?;

    validate(&response).map_err(|reason| AgentError::OracleMalformed {
        reason,
        raw: raw.to_string(),
    })?;

    Ok(response)
}

/// serde 之外的形状校验：工具名非空、步骤 id 唯一
fn validate(response: &OracleResponse) -> Result<(), String> {
    let check_steps = |steps: &[Step]| -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for step in steps {
            if step.tool.trim().is_empty() {
                return Err(format!("step {} has empty tool name", step.id));
            }
            if !seen.insert(step.id) {
                return Err(format!("duplicate step id {}", step.id));
            }
        }
        Ok(())
    };

    match response {
        OracleResponse::Plan(plan) => check_steps(&plan.steps),
        OracleResponse::Replan { steps } => check_steps(steps),
        OracleResponse::Explore(action) => {
            if action.tool.trim().is_empty() {
                Err("explore action has empty tool name".to_string())
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// 计划响应的 JSON Schema（注入提示词，减少格式错误）
pub fn plan_schema_json() -> String {
    let schema = schema_for!(Plan);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_from_fenced_json() {
        let raw = r#"Here is the plan:
```json
{"type": "plan", "goal": "create file", "steps": [
  {"id": 1, "description": "write it", "tool": "write_file",
   "params": {"path": "a.txt", "content": "hi"},
   "verify": {"kind": "file_exists", "path": "a.txt"}}
]}
```
"#;
        let response = parse_response(raw).unwrap();
        match response {
            OracleResponse::Plan(plan) => {
                assert_eq!(plan.steps.len(), 1);
                assert_eq!(plan.steps[0].tool, "write_file");
            }
            other => panic!("expected plan, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bare_json_explore() {
        let raw = r#"{"type": "explore", "tool": "list_files", "params": {"path": "."}, "reasoning": "see layout"}"#;
        match parse_response(raw).unwrap() {
            OracleResponse::Explore(action) => assert_eq!(action.tool, "list_files"),
            other => panic!("expected explore, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_findings_sufficient() {
        let raw = r#"{"type": "findings_sufficient", "summary": "repo is a rust workspace"}"#;
        assert!(matches!(
            parse_response(raw).unwrap(),
            OracleResponse::FindingsSufficient { .. }
        ));
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = parse_response("I think we should look around first.").unwrap_err();
        match err {
            AgentError::OracleMalformed { raw, .. } => assert!(raw.contains("look around")),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let err = parse_response(r#"{"type": "dance", "steps": []}"#).unwrap_err();
        assert!(matches!(err, AgentError::OracleMalformed { .. }));
    }

    #[test]
    fn test_empty_tool_name_rejected() {
        let raw = r#"{"type": "plan", "goal": "g", "steps": [
            {"id": 1, "description": "x", "tool": "", "params": {}}
        ]}"#;
        let err = parse_response(raw).unwrap_err();
        match err {
            AgentError::OracleMalformed { reason, .. } => assert!(reason.contains("empty tool")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let raw = r#"{"type": "plan", "goal": "g", "steps": [
            {"id": 1, "description": "a", "tool": "list_files", "params": {}},
            {"id": 1, "description": "b", "tool": "read_file", "params": {}}
        ]}"#;
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn test_empty_plan_parses_ok() {
        // 空计划在形状上合法；是否接受由状态机决定（PlanningEmpty 策略）
        let raw = r#"{"type": "plan", "goal": "g", "steps": []}"#;
        match parse_response(raw).unwrap() {
            OracleResponse::Plan(plan) => assert!(plan.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_analysis_defaults() {
        let raw = r#"{"type": "analysis", "mode": "fast"}"#;
        match parse_response(raw).unwrap() {
            OracleResponse::Analysis(a) => {
                assert_eq!(a.recommended_mode(), TaskMode::Fast);
                assert_eq!(a.complexity, "medium");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_schema_json_nonempty() {
        let schema = plan_schema_json();
        assert!(schema.contains("steps"));
    }
}
