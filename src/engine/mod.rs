//! 任务执行引擎：分析、探索、规划/执行/验证循环与重规划

pub mod analyzer;
pub mod events;
pub mod executor;
pub mod explorer;
pub mod loop_;
pub mod verifier;

pub use events::EngineEvent;
pub use executor::StepExecutor;
pub use explorer::{looks_truncated, ExplorationStats, Explorer};
pub use loop_::{EngineState, TaskEngine, TaskReport};
