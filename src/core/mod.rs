//! 核心类型：错误分类、单步结果、任务模型

pub mod error;
pub mod task;

pub use error::{AgentError, StepOutcome};
pub use task::{Task, TaskMode};
