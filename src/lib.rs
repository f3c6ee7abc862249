//! Mantis - Rust 终端任务智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **confirm**: 交互确认（带超时的默认拒绝策略）
//! - **core**: 错误分类、单步结果、任务模型
//! - **engine**: 分析 / 探索 / 规划 / 执行 / 验证 / 重规划状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 工作记忆（循环检测）、观察日志（压缩）、任务历史
//! - **oracle**: Oracle 边界（提示词、响应校验、重试）
//! - **plan**: 计划与步骤模型（单调状态、验证判据）
//! - **safety**: 风险评分与毁灭性命令黑名单
//! - **tools**: 工具箱（文件、搜索、shell、git、docker、http）与派发器

pub mod config;
pub mod confirm;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod oracle;
pub mod plan;
pub mod safety;
pub mod tools;

pub use engine::{TaskEngine, TaskReport};
