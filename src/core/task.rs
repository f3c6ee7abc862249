//! 任务模型
//!
//! Task 在提交时创建，之后不可变；每个 Task 独占一份 WorkingMemory 与 ContextManager，
//! 生命周期与 Task 一致，Task 终止后随之丢弃。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 执行模式：决定探索与规划深度，不影响正确性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// 确定性小任务：跳过探索，直接规划执行
    Fast,
    /// 默认：有限探索 + 规划/执行/验证循环
    Hybrid,
    /// 探索为主：更大的探索步数上限
    Exploratory,
}

impl TaskMode {
    /// 解析 CLI / Oracle 给出的模式名；未知值回退 Hybrid
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "fast" | "direct" => TaskMode::Fast,
            "exploratory" | "explore" => TaskMode::Exploratory,
            _ => TaskMode::Hybrid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskMode::Fast => "fast",
            TaskMode::Hybrid => "hybrid",
            TaskMode::Exploratory => "exploratory",
        }
    }
}

/// 一次任务提交：id + 目标文本 + 模式，创建后不再变更
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub goal: String,
    pub mode: TaskMode,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(goal: impl Into<String>, mode: TaskMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            goal: goal.into(),
            mode,
            created_at: Utc::now(),
        }
    }
}
