//! 记忆层：工作记忆（循环检测）、观察日志（压缩）、任务历史（跨会话）

pub mod history;
pub mod observations;
pub mod working;

pub use history::{HistoryStore, JsonHistoryStore, NoopHistoryStore, SimilarTask, TaskRecord};
pub use observations::{compress, ContextManager, Observation, ObservationKind};
pub use working::{AttemptSignature, CommandRecord, WorkingMemory, WorkingMemoryStats};
