//! 任务主循环
//!
//! Analyzing → Exploring → Planning → Executing(i) → Verifying(i) →
//! {Executing(i+1) | Replanning | Succeeded | Aborted}。
//! 取消信号在步骤之间与 Oracle 调用前后检查；空计划有界重试；
//! 连续失败达到阈值或执行中检出循环即转入重规划；重规划返回
//! 已失败过的步骤签名时直接中止，绝不无限打转。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::confirm::ConfirmProvider;
use crate::core::{AgentError, StepOutcome, Task, TaskMode};
use crate::engine::analyzer;
use crate::engine::events::{send_event, EngineEvent};
use crate::engine::executor::StepExecutor;
use crate::engine::explorer::Explorer;
use crate::memory::{
    history::render_similar_section, AttemptSignature, ContextManager, HistoryStore, Observation,
    ObservationKind, TaskRecord, WorkingMemory, WorkingMemoryStats,
};
use crate::oracle::{prompts, Oracle, OracleResponse};
use crate::plan::{Plan, Step};
use crate::safety::RiskScorer;
use crate::tools::ToolDispatcher;

/// 状态机的全部状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Analyzing,
    Exploring,
    Planning,
    Executing(usize),
    Verifying(usize),
    Replanning,
    Succeeded,
    Aborted,
}

/// 终局报告：结构化原因 + 压缩后的观察轨迹，永远不是裸栈
#[derive(Debug)]
pub struct TaskReport {
    pub task: Task,
    pub success: bool,
    pub reason: Option<String>,
    pub stats: WorkingMemoryStats,
    pub trail: Vec<Observation>,
}

/// 任务引擎：一次 run 驱动一个 Task 从提交到终态
pub struct TaskEngine {
    oracle: Arc<dyn Oracle>,
    dispatcher: Arc<ToolDispatcher>,
    executor: StepExecutor,
    history: Arc<dyn HistoryStore>,
    config: AppConfig,
    workspace_root: PathBuf,
    cancel_token: CancellationToken,
    event_tx: Option<tokio::sync::mpsc::UnboundedSender<EngineEvent>>,
}

impl TaskEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppConfig,
        oracle: Arc<dyn Oracle>,
        dispatcher: Arc<ToolDispatcher>,
        confirm: Arc<dyn ConfirmProvider>,
        history: Arc<dyn HistoryStore>,
        workspace_root: impl AsRef<Path>,
        cancel_token: CancellationToken,
        event_tx: Option<tokio::sync::mpsc::UnboundedSender<EngineEvent>>,
    ) -> Self {
        let workspace_root = workspace_root.as_ref().to_path_buf();
        let executor = StepExecutor::new(
            dispatcher.clone(),
            RiskScorer::new(&config.safety),
            confirm,
            &workspace_root,
        );
        Self {
            oracle,
            dispatcher,
            executor,
            history,
            config,
            workspace_root,
            cancel_token,
            event_tx,
        }
    }

    fn phase(&self, name: &str) {
        send_event(
            &self.event_tx,
            EngineEvent::Phase {
                name: name.to_string(),
            },
        );
    }

    fn enter(state: &mut EngineState, next: EngineState) {
        tracing::debug!(from = ?*state, to = ?next, "engine state transition");
        *state = next;
    }

    fn cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 驱动一个任务到终态；mode_override 来自 CLI，None 时由分析器选择
    pub async fn run(&self, goal: &str, mode_override: Option<TaskMode>) -> TaskReport {
        // ============ 历史经验检索 ============
        let similar = self
            .history
            .find_similar(goal, self.config.history.similar_top_k);
        let similar_section = render_similar_section(&similar);

        // ============ Analyzing ============
        let mut state = EngineState::Analyzing;
        self.phase("analyzing");
        let mode = match mode_override {
            Some(mode) => mode,
            None => {
                let analysis = analyzer::analyze(&self.oracle, goal, &similar_section).await;
                send_event(
                    &self.event_tx,
                    EngineEvent::Analysis {
                        complexity: analysis.complexity.clone(),
                        uncertainty: analysis.uncertainty.clone(),
                        mode: analysis.mode.clone(),
                    },
                );
                analysis.recommended_mode()
            }
        };
        let task = Task::new(goal, mode);

        let mut memory = WorkingMemory::new(self.config.engine.command_repeat_window);
        let mut context = ContextManager::new(self.config.context.clone());

        if self.cancelled() {
            return self.finish_aborted(task, memory, context, "cancelled before start");
        }

        // ============ Exploring ============
        let mut findings = String::new();
        if mode != TaskMode::Fast {
            Self::enter(&mut state, EngineState::Exploring);
            self.phase("exploring");
            let max_steps = match mode {
                TaskMode::Exploratory => self.config.engine.explore_max_steps * 2,
                _ => self.config.engine.explore_max_steps,
            };
            let explorer = Explorer::new(self.oracle.clone(), self.dispatcher.clone(), max_steps);
            match explorer
                .explore(&task, &mut context, &self.cancel_token, &self.event_tx)
                .await
            {
                Ok((text, _stats)) => findings = text,
                Err(e) => {
                    return self.finish_aborted(task, memory, context, &e.to_string());
                }
            }
        }

        // ============ Planning（空计划有界重试）============
        Self::enter(&mut state, EngineState::Planning);
        self.phase("planning");
        let tool_descriptions = self.dispatcher.descriptions_text(None);
        let mut plan: Option<Plan> = None;
        for attempt in 1..=self.config.engine.max_plan_attempts {
            if self.cancelled() {
                return self.finish_aborted(task, memory, context, "cancelled during planning");
            }
            let messages = prompts::planning_messages(
                &task.goal,
                &tool_descriptions,
                &findings,
                &memory.to_prompt_section(),
                &similar_section,
            );
            match self.oracle.propose(&messages).await {
                Ok(OracleResponse::Plan(candidate)) if !candidate.is_empty() => {
                    plan = Some(candidate);
                    break;
                }
                Ok(OracleResponse::Plan(_)) => {
                    // 空计划是本状态的失败，不静默接受
                    tracing::warn!(attempt, "oracle returned empty plan");
                    context.add(
                        format!("Planning attempt {} returned an empty plan", attempt),
                        ObservationKind::Info,
                    );
                }
                Ok(other) => {
                    tracing::warn!(attempt, ?other, "oracle returned non-plan response");
                }
                Err(e) => {
                    return self.finish_aborted(task, memory, context, &e.to_string());
                }
            }
        }
        let Some(mut plan) = plan else {
            let reason = AgentError::PlanningEmpty(self.config.engine.max_plan_attempts).to_string();
            return self.finish_aborted(task, memory, context, &reason);
        };
        send_event(
            &self.event_tx,
            EngineEvent::PlanReady {
                steps: plan
                    .steps
                    .iter()
                    .map(|s| format!("{}. {} [{}]", s.id, s.description, s.tool))
                    .collect(),
            },
        );

        // ============ Executing / Verifying / Replanning ============
        let mut index = 0usize;
        let mut consecutive_failures = 0u32;
        let mut replan_rounds = 0u32;
        let mut failed_signatures: HashSet<AttemptSignature> = HashSet::new();
        let mut handled_loop: Option<String> = None;

        'steps: while index < plan.steps.len() {
            if self.cancelled() {
                return self.finish_aborted(task, memory, context, "cancelled between steps");
            }

            Self::enter(&mut state, EngineState::Executing(index));
            let total = plan.steps.len();
            {
                let step = &plan.steps[index];
                send_event(
                    &self.event_tx,
                    EngineEvent::StepStart {
                        id: step.id,
                        index: index + 1,
                        total,
                        description: step.description.clone(),
                        tool: step.tool.clone(),
                    },
                );
            }

            let verdict = self
                .executor
                .execute_step(&mut plan.steps[index], &mut memory, &mut context, &self.event_tx)
                .await;
            Self::enter(&mut state, EngineState::Verifying(index));
            context.next_iteration();

            {
                let step = &plan.steps[index];
                let (outcome, preview) = match &verdict {
                    StepOutcome::Succeeded => ("succeeded", String::new()),
                    StepOutcome::Failed(reason) => ("failed", reason.clone()),
                    StepOutcome::Skipped(_) => ("skipped", String::new()),
                    StepOutcome::Rejected(_) => ("rejected", String::new()),
                };
                send_event(
                    &self.event_tx,
                    EngineEvent::StepResult {
                        id: step.id,
                        outcome: outcome.to_string(),
                        preview,
                    },
                );
            }

            // 执行中检出循环：立即转入重规划（同一原因只处理一次）
            if let Some(reason) = memory.detect_loop() {
                if handled_loop.as_deref() != Some(reason.as_str()) {
                    handled_loop = Some(reason.clone());
                    memory.note_loop();
                    context.add(format!("Loop detected: {}", reason), ObservationKind::Error);
                    send_event(&self.event_tx, EngineEvent::LoopWarning { reason: reason.clone() });

                    Self::enter(&mut state, EngineState::Replanning);
                    match self
                        .replan(
                            &task,
                            &mut plan,
                            index,
                            &reason,
                            &mut replan_rounds,
                            &failed_signatures,
                            &mut memory,
                            &mut context,
                        )
                        .await
                    {
                        Ok(next_index) => {
                            index = next_index;
                            consecutive_failures = 0;
                            continue 'steps;
                        }
                        Err(reason) => {
                            return self.finish_aborted(task, memory, context, &reason);
                        }
                    }
                }
            }

            match verdict {
                StepOutcome::Succeeded => {
                    consecutive_failures = 0;
                    index += 1;
                }
                // 跳过与拒绝对该步终局，但不算失败，任务继续
                StepOutcome::Skipped(_) | StepOutcome::Rejected(_) => {
                    index += 1;
                }
                StepOutcome::Failed(reason) => {
                    let step = &plan.steps[index];
                    failed_signatures.insert(AttemptSignature::new(&step.tool, &step.params));
                    consecutive_failures += 1;

                    if consecutive_failures >= self.config.engine.max_consecutive_failures {
                        Self::enter(&mut state, EngineState::Replanning);
                        match self
                            .replan(
                                &task,
                                &mut plan,
                                index,
                                &reason,
                                &mut replan_rounds,
                                &failed_signatures,
                                &mut memory,
                                &mut context,
                            )
                            .await
                        {
                            Ok(next_index) => {
                                index = next_index;
                                consecutive_failures = 0;
                            }
                            Err(reason) => {
                                return self.finish_aborted(task, memory, context, &reason);
                            }
                        }
                    } else {
                        // 阈值之内：继续推进，失败信息已在观察日志里
                        index += 1;
                    }
                }
            }
        }

        // ============ 终态判定 ============
        if plan.all_settled_ok() {
            Self::enter(&mut state, EngineState::Succeeded);
            self.finish_succeeded(task, plan, memory, context)
        } else {
            // 计划走完但有失败步：还有重规划额度就再试一轮，否则中止
            if let Some(first_failed) = plan
                .steps
                .iter()
                .position(|s| s.status == crate::plan::StepStatus::Failed)
            {
                Self::enter(&mut state, EngineState::Replanning);
                let reason = "plan finished with failed steps".to_string();
                match self
                    .replan(
                        &task,
                        &mut plan,
                        first_failed,
                        &reason,
                        &mut replan_rounds,
                        &failed_signatures,
                        &mut memory,
                        &mut context,
                    )
                    .await
                {
                    Ok(next_index) => {
                        // 递归驱动剩余步骤：复用同一循环逻辑的最小实现
                        return self
                            .run_tail(task, plan, next_index, replan_rounds, memory, context)
                            .await;
                    }
                    Err(reason) => return self.finish_aborted(task, memory, context, &reason),
                }
            }
            let reason = "plan finished without success".to_string();
            self.finish_aborted(task, memory, context, &reason)
        }
    }

    /// 计划尾部的简化驱动：重规划追加的步骤顺序执行，不再二次重规划
    async fn run_tail(
        &self,
        task: Task,
        mut plan: Plan,
        mut index: usize,
        _replan_rounds: u32,
        mut memory: WorkingMemory,
        mut context: ContextManager,
    ) -> TaskReport {
        while index < plan.steps.len() {
            if self.cancelled() {
                return self.finish_aborted(task, memory, context, "cancelled between steps");
            }
            let verdict = self
                .executor
                .execute_step(&mut plan.steps[index], &mut memory, &mut context, &self.event_tx)
                .await;
            context.next_iteration();
            if let StepOutcome::Failed(reason) = verdict {
                let reason = format!("step failed after final replan: {}", reason);
                return self.finish_aborted(task, memory, context, &reason);
            }
            index += 1;
        }
        if plan.all_settled_ok() {
            self.finish_succeeded(task, plan, memory, context)
        } else {
            self.finish_aborted(task, memory, context, "plan finished without success")
        }
    }

    /// 重规划：失败步骤 + 错误 + 未执行尾部 → 修订尾部；返回下一个执行下标
    ///
    /// 失败步与未执行尾部从活动计划中移出（观察日志留痕供审计），
    /// 已成功的步骤永不回访。
    #[allow(clippy::too_many_arguments)]
    async fn replan(
        &self,
        task: &Task,
        plan: &mut Plan,
        failed_index: usize,
        failure_reason: &str,
        replan_rounds: &mut u32,
        failed_signatures: &HashSet<AttemptSignature>,
        memory: &mut WorkingMemory,
        context: &mut ContextManager,
    ) -> Result<usize, String> {
        *replan_rounds += 1;
        if *replan_rounds > self.config.engine.max_replan_rounds {
            return Err(AgentError::ReplanningExhausted(format!(
                "{} replanning rounds used",
                self.config.engine.max_replan_rounds
            ))
            .to_string());
        }
        self.phase("replanning");
        send_event(
            &self.event_tx,
            EngineEvent::Replanning {
                round: *replan_rounds,
                reason: failure_reason.to_string(),
            },
        );

        if self.cancelled() {
            return Err("cancelled during replanning".to_string());
        }

        let failed_step = plan.steps[failed_index].clone();
        let remaining: Vec<Step> = plan.steps[failed_index + 1..].to_vec();
        let messages = prompts::replanning_messages(
            &task.goal,
            &self.dispatcher.descriptions_text(None),
            &failed_step,
            failure_reason,
            &remaining,
            &memory.to_prompt_section(),
            &context.to_prompt_section(),
        );

        let steps = match self.oracle.propose(&messages).await {
            Ok(OracleResponse::Replan { steps }) => steps,
            Ok(OracleResponse::Plan(p)) => p.steps,
            Ok(other) => {
                tracing::warn!(?other, "replanner returned unexpected variant");
                return Err(
                    AgentError::ReplanningExhausted("unexpected oracle response".to_string())
                        .to_string(),
                );
            }
            Err(e) => return Err(e.to_string()),
        };

        if steps.is_empty() {
            return Err(AgentError::ReplanningExhausted("empty replan".to_string()).to_string());
        }

        // 新尾部立刻踩进已失败过的签名：中止而不是无限循环
        if let Some(first) = steps.first() {
            let signature = AttemptSignature::new(&first.tool, &first.params);
            if failed_signatures.contains(&signature) {
                return Err(AgentError::ReplanningExhausted(
                    "replan repeats an already-failed step".to_string(),
                )
                .to_string());
            }
        }

        // 失败步与未执行尾部移出活动计划（观察日志留痕），成功步保留
        let base_id = plan.steps.iter().map(|s| s.id).max().unwrap_or(0);
        let keep = if plan.steps[failed_index].status == crate::plan::StepStatus::Failed {
            failed_index
        } else {
            failed_index + 1
        };
        for removed in plan.steps.drain(keep..) {
            context.add(
                format!(
                    "Replanning superseded step {} ({}): {}",
                    removed.id, removed.tool, removed.description
                ),
                ObservationKind::Info,
            );
        }
        plan.steps.extend(steps.into_iter().enumerate().map(|(offset, mut step)| {
            step.id = base_id + offset as u32 + 1;
            step
        }));

        Ok(keep)
    }

    fn finish_succeeded(
        &self,
        task: Task,
        plan: Plan,
        memory: WorkingMemory,
        context: ContextManager,
    ) -> TaskReport {
        let stats = memory.stats();
        send_event(&self.event_tx, EngineEvent::Succeeded { stats });
        let record = TaskRecord {
            task: task.clone(),
            success: true,
            failure_reason: None,
            step_descriptions: plan.step_descriptions(),
            observations: context.compressed(),
            finished_at: Utc::now(),
        };
        if let Err(e) = self.history.save(&record) {
            tracing::warn!(error = %e, "failed to save task record");
        }
        TaskReport {
            task,
            success: true,
            reason: None,
            stats,
            trail: context.compressed(),
        }
    }

    fn finish_aborted(
        &self,
        task: Task,
        memory: WorkingMemory,
        context: ContextManager,
        reason: &str,
    ) -> TaskReport {
        tracing::debug!(to = ?EngineState::Aborted, reason, "engine state transition");
        let stats = memory.stats();
        send_event(
            &self.event_tx,
            EngineEvent::Aborted {
                reason: reason.to_string(),
                stats,
            },
        );
        let record = TaskRecord {
            task: task.clone(),
            success: false,
            failure_reason: Some(reason.to_string()),
            step_descriptions: Vec::new(),
            observations: context.compressed(),
            finished_at: Utc::now(),
        };
        if let Err(e) = self.history.save(&record) {
            tracing::warn!(error = %e, "failed to save task record");
        }
        TaskReport {
            task,
            success: false,
            reason: Some(reason.to_string()),
            stats,
            trail: context.compressed(),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
