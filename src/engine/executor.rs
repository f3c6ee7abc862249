//! 单步执行：风险门控 → 确认 → 派发 → 验证
//!
//! 不可执行的风险分使该步 skipped（任务不中止）；确认被拒记为 rejection
//! 观察（critical）后继续后续步骤；拒绝与阻断都不自动重试。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::confirm::ConfirmProvider;
use crate::core::StepOutcome;
use crate::engine::events::{send_event, EngineEvent};
use crate::engine::verifier;
use crate::memory::{ContextManager, ObservationKind, WorkingMemory};
use crate::plan::{Step, StepStatus};
use crate::safety::{GateAction, RiskLevel, RiskScorer};
use crate::tools::ToolDispatcher;

/// 观察内容预览长度
const PREVIEW_CHARS: usize = 500;

pub(crate) fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let cut: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// 单步执行器：持有派发器、风险层与确认通道
pub struct StepExecutor {
    dispatcher: Arc<ToolDispatcher>,
    scorer: RiskScorer,
    confirm: Arc<dyn ConfirmProvider>,
    workspace_root: PathBuf,
}

impl StepExecutor {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        scorer: RiskScorer,
        confirm: Arc<dyn ConfirmProvider>,
        workspace_root: impl AsRef<Path>,
    ) -> Self {
        Self {
            dispatcher,
            scorer,
            confirm,
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }

    pub async fn execute_step(
        &self,
        step: &mut Step,
        memory: &mut WorkingMemory,
        context: &mut ContextManager,
        event_tx: &Option<tokio::sync::mpsc::UnboundedSender<EngineEvent>>,
    ) -> StepOutcome {
        let risk = self.scorer.score(&step.tool, &step.params);

        if risk.level >= RiskLevel::High {
            send_event(
                event_tx,
                EngineEvent::RiskWarning {
                    tool: step.tool.clone(),
                    score: risk.value,
                    level: risk.level.as_str().to_string(),
                },
            );
        }

        match self.scorer.gate(&step.tool, &risk) {
            GateAction::Block => {
                // 不可执行区间：该步跳过，任务继续
                step.transition(StepStatus::Skipped);
                context.add(
                    format!(
                        "Step {} blocked by risk gate: {} (score {}). Step skipped.",
                        step.id, step.tool, risk.value
                    ),
                    ObservationKind::Error,
                );
                tracing::warn!(step = step.id, tool = %step.tool, score = risk.value, "step blocked");
                return StepOutcome::Skipped("risk gate".to_string());
            }
            GateAction::Confirm => {
                let description = format!(
                    "step {}: {} [{} {}]",
                    step.id,
                    step.description,
                    step.tool,
                    preview(&step.params.to_string())
                );
                if !self.confirm.confirm(&description, &risk).await {
                    step.transition(StepStatus::Skipped);
                    context.add_rejection(&description);
                    return StepOutcome::Rejected(description);
                }
            }
            GateAction::Execute => {}
        }

        step.transition(StepStatus::Running);

        // UnknownTool / ToolTimeout：记 critical 观察，交还重规划，不在此处盲目重试
        let result = match self.dispatcher.execute(&step.tool, &step.params, None).await {
            Ok(result) => result,
            Err(e) => {
                step.transition(StepStatus::Failed);
                context.add(format!("Step {}: {}", step.id, e), ObservationKind::Error);
                return StepOutcome::Failed(e.to_string());
            }
        };

        memory.record(&step.tool, &step.params, result.success);

        let kind = if step.tool == "execute_command" {
            ObservationKind::CommandResult
        } else {
            ObservationKind::ToolResult
        };

        match verifier::verify(&step.verify, &result, &self.workspace_root) {
            Ok(()) => {
                step.transition(StepStatus::Succeeded);
                context.add(
                    format!("Step {} ({}) ok: {}", step.id, step.tool, preview(result.render())),
                    kind,
                );
                StepOutcome::Succeeded
            }
            Err(reason) => {
                step.transition(StepStatus::Failed);
                context.add(
                    format!(
                        "Step {} ({}) failed verification: {}. Output: {}",
                        step.id,
                        step.tool,
                        reason,
                        preview(result.render())
                    ),
                    ObservationKind::Error,
                );
                StepOutcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextSection, SafetySection, ToolsSection};
    use crate::confirm::{AutoApprove, ScriptedConfirm};
    use crate::plan::VerifySpec;
    use crate::tools::{default_registry, ToolDispatcher};
    use serde_json::json;
    use tempfile::TempDir;

    fn executor(dir: &TempDir, confirm: Arc<dyn ConfirmProvider>) -> StepExecutor {
        let registry = default_registry(dir.path(), &ToolsSection::default());
        let dispatcher = Arc::new(ToolDispatcher::new(registry, 30, 20_000));
        StepExecutor::new(
            dispatcher,
            RiskScorer::new(&SafetySection::default()),
            confirm,
            dir.path(),
        )
    }

    fn step(tool: &str, params: serde_json::Value, verify: VerifySpec) -> Step {
        Step {
            id: 1,
            description: "test step".to_string(),
            tool: tool.to_string(),
            params,
            verify,
            status: StepStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_blocked_step_is_skipped_and_critical() {
        // 风险分 95：跳过而不是中止，critical 观察留痕
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, Arc::new(AutoApprove));
        let mut s = step(
            "execute_command",
            json!({"command": "rm -rf /"}),
            VerifySpec::ToolSuccess,
        );
        let mut memory = WorkingMemory::new(3);
        let mut context = ContextManager::new(ContextSection::default());

        let verdict = exec.execute_step(&mut s, &mut memory, &mut context, &None).await;
        assert!(matches!(verdict, StepOutcome::Skipped(_)));
        assert_eq!(s.status, StepStatus::Skipped);
        assert_eq!(context.critical_count(), 1);
        // 未真正执行，不进工作记忆
        assert_eq!(memory.commands_run().len(), 0);
    }

    #[tokio::test]
    async fn test_rejected_step_records_rejection() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, Arc::new(ScriptedConfirm::new(vec![false])));
        let mut s = step(
            "write_file",
            json!({"path": "a.txt", "content": "x"}),
            VerifySpec::ToolSuccess,
        );
        let mut memory = WorkingMemory::new(3);
        let mut context = ContextManager::new(ContextSection::default());

        let verdict = exec.execute_step(&mut s, &mut memory, &mut context, &None).await;
        assert!(matches!(verdict, StepOutcome::Rejected(_)));
        assert!(context.all().iter().any(|o| o.is_critical));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_successful_step_with_file_exists_verify() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, Arc::new(AutoApprove));
        let mut s = step(
            "write_file",
            json!({"path": "out.txt", "content": "data"}),
            VerifySpec::FileExists {
                path: "out.txt".to_string(),
            },
        );
        let mut memory = WorkingMemory::new(3);
        let mut context = ContextManager::new(ContextSection::default());

        let verdict = exec.execute_step(&mut s, &mut memory, &mut context, &None).await;
        assert_eq!(verdict, StepOutcome::Succeeded);
        assert_eq!(s.status, StepStatus::Succeeded);
        assert_eq!(memory.files_written(), &["out.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_step() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, Arc::new(AutoApprove));
        let mut s = step("telepathy", json!({}), VerifySpec::ToolSuccess);
        let mut memory = WorkingMemory::new(3);
        let mut context = ContextManager::new(ContextSection::default());

        let verdict = exec.execute_step(&mut s, &mut memory, &mut context, &None).await;
        assert!(matches!(verdict, StepOutcome::Failed(_)));
        assert_eq!(s.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_verification_failure_marks_failed() {
        let dir = TempDir::new().unwrap();
        let exec = executor(&dir, Arc::new(AutoApprove));
        let mut s = step(
            "write_file",
            json!({"path": "a.txt", "content": "x"}),
            VerifySpec::FileExists {
                path: "different.txt".to_string(),
            },
        );
        let mut memory = WorkingMemory::new(3);
        let mut context = ContextManager::new(ContextSection::default());

        let verdict = exec.execute_step(&mut s, &mut memory, &mut context, &None).await;
        assert!(matches!(verdict, StepOutcome::Failed(_)));
    }
}
