//! 计划模型
//!
//! Plan 由 Oracle 生成，重规划时整体替换尾部；Step 状态只能单调前进
//! pending → running → {succeeded, failed, skipped}，永不回退。
//! VerifySpec 是 Planner 随步骤给出的成功判据，由 Verifier 在执行后评估。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 步骤状态（单调）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped)
    }
}

/// 验证判据：Planner 随步骤提供，缺省用工具自身的 success 标志
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifySpec {
    /// 工具报告成功即可
    #[default]
    ToolSuccess,
    /// 命令退出码为 0（metadata.exit_code）
    ExitCodeZero,
    /// 输出包含指定子串
    OutputContains { value: String },
    /// 指定文件存在（相对工作区）
    FileExists { path: String },
}

/// 计划中的一步：工具调用 + 验证判据
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    pub id: u32,
    /// 人类可读的步骤描述
    pub description: String,
    pub tool: String,
    /// 工具参数（不透明键值）
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub verify: VerifySpec,
    #[serde(default = "default_status", skip_deserializing)]
    #[schemars(skip)]
    pub status: StepStatus,
}

fn default_status() -> StepStatus {
    StepStatus::Pending
}

impl Step {
    /// 仅接受合法的单调转移；非法转移拒绝并返回 false
    pub fn transition(&mut self, next: StepStatus) -> bool {
        let legal = matches!(
            (self.status, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Succeeded)
                | (StepStatus::Running, StepStatus::Failed)
                | (StepStatus::Running, StepStatus::Skipped)
        );
        if legal {
            self.status = next;
        } else {
            tracing::warn!(
                step = self.id,
                from = ?self.status,
                to = ?next,
                "illegal step status transition ignored"
            );
        }
        legal
    }
}

/// 一份有序计划；只有步骤状态可变，其余字段由 Oracle 产出后不再修改
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 全部步骤处于 succeeded / skipped 即任务完成
    pub fn all_settled_ok(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Succeeded | StepStatus::Skipped))
    }

    /// 已终结（成功）的步骤描述，供历史存档
    pub fn step_descriptions(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.description.clone()).collect()
    }
}
