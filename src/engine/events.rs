//! 引擎过程事件：流式推送给 CLI 展示
//!
//! 可序列化为 JSON；终端渲染由二进制侧负责，引擎只负责发。

use serde::Serialize;

use crate::memory::WorkingMemoryStats;

/// 任务执行过程事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 状态机进入新阶段
    Phase { name: String },
    /// 任务分析结论
    Analysis {
        complexity: String,
        uncertainty: String,
        mode: String,
    },
    /// 探索阶段执行了一次工具调用
    ExploreStep {
        tool: String,
        preview: String,
    },
    /// 探索阶段避开了一次重复调用（替代工具表生效）
    ExploreSubstituted {
        from: String,
        to: String,
    },
    /// 探索结束
    ExploreDone {
        steps: u32,
        loops_avoided: u32,
        narrowed: u32,
    },
    /// 计划就绪
    PlanReady { steps: Vec<String> },
    /// 某一步开始执行
    StepStart {
        id: u32,
        index: usize,
        total: usize,
        description: String,
        tool: String,
    },
    /// 高风险告警（执行前）
    RiskWarning {
        tool: String,
        score: u8,
        level: String,
    },
    /// 某一步的结果
    StepResult {
        id: u32,
        outcome: String,
        preview: String,
    },
    /// 执行中检出循环，转入重规划
    LoopWarning { reason: String },
    /// 重规划开始
    Replanning { round: u32, reason: String },
    /// 终态：成功
    Succeeded {
        stats: WorkingMemoryStats,
    },
    /// 终态：中止（带结构化原因）
    Aborted {
        reason: String,
        stats: WorkingMemoryStats,
    },
    Error { text: String },
}

/// 发送事件；接收端关闭时静默丢弃
pub fn send_event(tx: &Option<tokio::sync::mpsc::UnboundedSender<EngineEvent>>, event: EngineEvent) {
    if let Some(t) = tx {
        let _ = t.send(event);
    }
}
