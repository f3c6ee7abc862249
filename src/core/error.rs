//! Agent 错误类型与单步结果
//!
//! AgentError 覆盖 Oracle / 工具 / 风险门控 / 循环检测各层；
//! StepOutcome 把「拒绝」「跳过」作为数据在执行循环中传递，而不是异常。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（Oracle、工具、风险门控、循环等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Oracle timeout after {0} attempts")]
    OracleTimeout(u32),

    /// Oracle 返回的内容无法解析为任何合法变体；附原始输出供诊断
    #[error("Oracle returned malformed response: {reason}")]
    OracleMalformed { reason: String, raw: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// 风险分进入不可执行区间（91-100），该步只能跳过
    #[error("Operation blocked by risk gate: {tool} (score {score})")]
    RiskBlocked { tool: String, score: u8 },

    #[error("User rejected: {0}")]
    UserRejected(String),

    #[error("Loop detected: {0}")]
    LoopDetected(String),

    /// 规划多次返回空计划
    #[error("Planning produced an empty plan after {0} attempts")]
    PlanningEmpty(u32),

    #[error("Replanning exhausted: {0}")]
    ReplanningExhausted(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

/// 单步执行结果：拒绝与跳过是数据而非异常，循环据此决定继续还是转入重规划
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 执行并通过验证
    Succeeded,
    /// 执行失败或验证未通过；附原因
    Failed(String),
    /// 风险门控判定不可执行，整步跳过
    Skipped(String),
    /// 用户（或超时默认策略）拒绝执行
    Rejected(String),
}

impl StepOutcome {
    /// 失败与拒绝都会进入下一轮规划的上下文；跳过不算失败
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}
