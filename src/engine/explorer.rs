//! 只读侦察阶段
//!
//! Oracle 指引下最多 max_steps 次只读工具调用。每次调用前比对尝试签名：
//! 重复的调用不会再次派发给真实工具，而是查固定替代工具表换一条路；
//! 输出带截断痕迹时，同一工具的下一次调用自动收窄参数而不是原样重发。
//! 探索不改变任何外部状态，随时可以放弃。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, Task};
use crate::engine::events::{send_event, EngineEvent};
use crate::engine::executor::preview;
use crate::memory::{AttemptSignature, ContextManager, ObservationKind};
use crate::oracle::{prompts, ExploreAction, Oracle, OracleResponse};
use crate::safety::is_read_only_tool;
use crate::tools::{ToolDispatcher, TRUNCATION_MARKER};

/// 截断痕迹判定：工具输出是否被截断过（字面省略号 / truncated 字样）
pub fn looks_truncated(output: &str) -> bool {
    output.contains(TRUNCATION_MARKER)
        || output.contains("truncated")
        || output.trim_end().ends_with("...")
}

/// 固定替代工具表：宽列举 → 定向搜索 → 直接读取的降级链
fn alternative_action(action: &ExploreAction) -> ExploreAction {
    let path = action
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .unwrap_or(".")
        .to_string();

    let (tool, params) = match action.tool.as_str() {
        "list_files" => ("file_tree", serde_json::json!({"path": path, "max_depth": 2})),
        "file_tree" => ("list_files", serde_json::json!({"path": path})),
        "search_files" => ("file_tree", serde_json::json!({"path": path, "max_depth": 2})),
        "read_file" => (
            "search_files",
            serde_json::json!({
                "pattern": file_stem(&path),
                "path": ".",
                "max_results": 20
            }),
        ),
        "git_log" | "git_diff" => ("git_status", serde_json::json!({})),
        _ => ("list_files", serde_json::json!({"path": "."})),
    };

    ExploreAction {
        tool: tool.to_string(),
        params,
        reasoning: format!("substituted for repeated {}", action.tool),
    }
}

fn file_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

/// 上次输出被截断后的参数收窄：减小深度、压低条数上限
fn narrow_params(tool: &str, params: &Value) -> Value {
    let mut params = params.clone();
    let Some(map) = params.as_object_mut() else {
        return params;
    };
    match tool {
        "file_tree" => {
            let depth = map.get("max_depth").and_then(|v| v.as_u64()).unwrap_or(3);
            map.insert("max_depth".to_string(), Value::from(depth.saturating_sub(1).max(1)));
        }
        "search_files" => {
            let cap = map.get("max_results").and_then(|v| v.as_u64()).unwrap_or(50);
            map.insert("max_results".to_string(), Value::from((cap / 2).max(10)));
        }
        "git_log" => {
            let count = map.get("count").and_then(|v| v.as_u64()).unwrap_or(10);
            map.insert("count".to_string(), Value::from((count / 2).max(3)));
        }
        _ => {}
    }
    params
}

/// 探索统计
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplorationStats {
    pub steps: u32,
    pub loops_avoided: u32,
    pub narrowed: u32,
}

/// 探索器：Oracle + 只读工具派发
pub struct Explorer {
    oracle: Arc<dyn Oracle>,
    dispatcher: Arc<ToolDispatcher>,
    max_steps: u32,
}

impl Explorer {
    pub fn new(oracle: Arc<dyn Oracle>, dispatcher: Arc<ToolDispatcher>, max_steps: u32) -> Self {
        Self {
            oracle,
            dispatcher,
            max_steps,
        }
    }

    /// 执行侦察：返回发现文本（有序）与统计
    pub async fn explore(
        &self,
        task: &Task,
        context: &mut ContextManager,
        cancel_token: &CancellationToken,
        event_tx: &Option<tokio::sync::mpsc::UnboundedSender<EngineEvent>>,
    ) -> Result<(String, ExplorationStats), AgentError> {
        let mut stats = ExplorationStats::default();
        let mut findings: Vec<String> = Vec::new();
        let mut attempted: HashSet<AttemptSignature> = HashSet::new();
        // 工具名 → 上次输出是否带截断痕迹
        let mut truncated_last: HashMap<String, bool> = HashMap::new();

        let tool_descriptions = self
            .dispatcher
            .descriptions_text(Some(&is_read_only_tool));

        for _ in 0..self.max_steps {
            if cancel_token.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let messages = prompts::exploration_messages(
                &task.goal,
                &tool_descriptions,
                &findings.join("\n"),
                &context.to_prompt_section(),
            );

            let action = match self.oracle.propose(&messages).await? {
                OracleResponse::FindingsSufficient { summary } => {
                    if !summary.trim().is_empty() {
                        findings.push(summary);
                    }
                    break;
                }
                OracleResponse::Explore(action) => action,
                other => {
                    // 非探索变体按一次无效步处理，不中断侦察
                    tracing::warn!(?other, "unexpected oracle response during exploration");
                    stats.steps += 1;
                    continue;
                }
            };

            let mut action = if is_read_only_tool(&action.tool) {
                action
            } else {
                // 侦察阶段只许只读工具
                context.add(
                    format!("Exploration refused non-read-only tool '{}'", action.tool),
                    ObservationKind::Info,
                );
                stats.steps += 1;
                continue;
            };

            // 尝试签名比对：重复调用换替代工具，绝不二次派发同一调用
            let signature = AttemptSignature::new(&action.tool, &action.params);
            if attempted.contains(&signature) {
                let substituted = alternative_action(&action);
                send_event(
                    event_tx,
                    EngineEvent::ExploreSubstituted {
                        from: action.tool.clone(),
                        to: substituted.tool.clone(),
                    },
                );
                stats.loops_avoided += 1;
                action = substituted;

                let substituted_signature = AttemptSignature::new(&action.tool, &action.params);
                if attempted.contains(&substituted_signature) {
                    // 替代路径也走过了：这一步整个跳过
                    stats.steps += 1;
                    continue;
                }
            }

            // 上次该工具输出被截断：收窄参数而不是原样重发
            if truncated_last.get(&action.tool).copied().unwrap_or(false) {
                action.params = narrow_params(&action.tool, &action.params);
                stats.narrowed += 1;
            }

            attempted.insert(AttemptSignature::new(&action.tool, &action.params));
            stats.steps += 1;

            let result = match self.dispatcher.execute(&action.tool, &action.params, None).await {
                Ok(result) => result,
                Err(e) => {
                    context.add(format!("Exploration: {}", e), ObservationKind::Info);
                    continue;
                }
            };

            truncated_last.insert(action.tool.clone(), looks_truncated(&result.output));

            let line = format!("[{}] {}", action.tool, preview(result.render()));
            send_event(
                event_tx,
                EngineEvent::ExploreStep {
                    tool: action.tool.clone(),
                    preview: preview(result.render()),
                },
            );
            context.add(line.clone(), ObservationKind::ToolResult);
            findings.push(line);
            context.next_iteration();
        }

        send_event(
            event_tx,
            EngineEvent::ExploreDone {
                steps: stats.steps,
                loops_avoided: stats.loops_avoided,
                narrowed: stats.narrowed,
            },
        );

        Ok((findings.join("\n"), stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextSection, OracleSection, ToolsSection};
    use crate::core::TaskMode;
    use crate::llm::MockLlm;
    use crate::oracle::LlmOracle;
    use crate::tools::{default_registry, ToolDispatcher};
    use tempfile::TempDir;

    #[test]
    fn test_looks_truncated() {
        assert!(looks_truncated("entries\n...[truncated]"));
        assert!(looks_truncated("output was truncated here"));
        assert!(looks_truncated("partial listing ..."));
        assert!(!looks_truncated("complete output"));
    }

    #[test]
    fn test_narrow_params_depth() {
        let narrowed = narrow_params("file_tree", &serde_json::json!({"path": ".", "max_depth": 4}));
        assert_eq!(narrowed["max_depth"], serde_json::json!(3));
        // 不会降到 0
        let narrowed = narrow_params("file_tree", &serde_json::json!({"path": ".", "max_depth": 1}));
        assert_eq!(narrowed["max_depth"], serde_json::json!(1));
    }

    #[test]
    fn test_narrow_params_search_cap() {
        let narrowed =
            narrow_params("search_files", &serde_json::json!({"pattern": "x", "max_results": 50}));
        assert_eq!(narrowed["max_results"], serde_json::json!(25));
    }

    #[test]
    fn test_alternative_table_is_read_only() {
        for tool in ["list_files", "file_tree", "search_files", "read_file", "git_log"] {
            let action = ExploreAction {
                tool: tool.to_string(),
                params: serde_json::json!({"path": "src"}),
                reasoning: String::new(),
            };
            let alt = alternative_action(&action);
            assert!(is_read_only_tool(&alt.tool), "{} -> {}", tool, alt.tool);
            assert_ne!(alt.tool, tool);
        }
    }

    fn explorer_with(dir: &TempDir, responses: Vec<String>, max_steps: u32) -> Explorer {
        let llm = Arc::new(MockLlm::with_responses(responses));
        let oracle = Arc::new(LlmOracle::new(
            llm,
            &OracleSection {
                backoff_base_ms: 1,
                ..OracleSection::default()
            },
        ));
        let registry = default_registry(dir.path(), &ToolsSection::default());
        let dispatcher = Arc::new(ToolDispatcher::new(registry, 30, 20_000));
        Explorer::new(oracle, dispatcher, max_steps)
    }

    fn explore_response(tool: &str, params: serde_json::Value) -> String {
        serde_json::json!({"type": "explore", "tool": tool, "params": params, "reasoning": "look"})
            .to_string()
    }

    #[tokio::test]
    async fn test_repeated_signature_never_dispatched_twice() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "content").unwrap();

        // Oracle 固执地重复同一调用；第二次起必须走替代表
        let responses = vec![
            explore_response("list_files", serde_json::json!({"path": "."})),
            explore_response("list_files", serde_json::json!({"path": "."})),
            serde_json::json!({"type": "findings_sufficient", "summary": "done"}).to_string(),
        ];
        let explorer = explorer_with(&dir, responses, 5);
        let task = Task::new("inspect the workspace", TaskMode::Exploratory);
        let mut context = ContextManager::new(ContextSection::default());

        let (findings, stats) = explorer
            .explore(&task, &mut context, &CancellationToken::new(), &None)
            .await
            .unwrap();

        assert_eq!(stats.loops_avoided, 1);
        // 替代后的调用是 file_tree
        assert!(findings.contains("[file_tree]"));
        assert!(findings.contains("done"));
    }

    #[tokio::test]
    async fn test_non_read_only_tool_refused() {
        let dir = TempDir::new().unwrap();
        let responses = vec![
            explore_response("write_file", serde_json::json!({"path": "x", "content": "y"})),
            serde_json::json!({"type": "findings_sufficient", "summary": "nothing"}).to_string(),
        ];
        let explorer = explorer_with(&dir, responses, 5);
        let task = Task::new("look around", TaskMode::Hybrid);
        let mut context = ContextManager::new(ContextSection::default());

        explorer
            .explore(&task, &mut context, &CancellationToken::new(), &None)
            .await
            .unwrap();
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn test_stops_at_max_steps() {
        let dir = TempDir::new().unwrap();
        // 永远给新的探索动作（不同参数，不触发替代）
        let responses: Vec<String> = (0..10)
            .map(|i| explore_response("file_tree", serde_json::json!({"path": ".", "max_depth": i + 1})))
            .collect();
        let explorer = explorer_with(&dir, responses, 3);
        let task = Task::new("map everything", TaskMode::Exploratory);
        let mut context = ContextManager::new(ContextSection::default());

        let (_, stats) = explorer
            .explore(&task, &mut context, &CancellationToken::new(), &None)
            .await
            .unwrap();
        assert_eq!(stats.steps, 3);
    }
}
