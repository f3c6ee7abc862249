//! Oracle 边界
//!
//! 核心把外部推理服务视为不透明、可能缓慢、可能输出错误格式的依赖：
//! 每次调用裹超时，超时与格式错误在本地有界重试（指数退避），
//! 重试耗尽产生带最后原始输出的类型化错误，永不挂起、永不崩溃。

pub mod prompts;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::OracleSection;
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};

pub use response::{ExploreAction, OracleResponse, TaskAnalysis};

/// Oracle 接口：输入提示消息，输出已校验的标签变体
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn propose(&self, messages: &[Message]) -> Result<OracleResponse, AgentError>;
}

/// 基于 LlmClient 的实现：超时 + 有界重试 + 响应校验
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    request_timeout: Duration,
    max_retries: u32,
    backoff_base: Duration,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: &OracleSection) -> Self {
        Self {
            llm,
            request_timeout: Duration::from_secs(cfg.request_timeout_secs),
            max_retries: cfg.max_retries.max(1),
            backoff_base: Duration::from_millis(cfg.backoff_base_ms),
        }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn propose(&self, messages: &[Message]) -> Result<OracleResponse, AgentError> {
        let mut last_malformed: Option<AgentError> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // 指数退避：base * 2^(attempt-1)
                let wait = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(wait).await;
            }

            let raw = match tokio::time::timeout(self.request_timeout, self.llm.complete(messages)).await
            {
                Err(_) => {
                    tracing::warn!(attempt, "oracle request timed out");
                    continue;
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "oracle request failed");
                    continue;
                }
                Ok(Ok(raw)) => raw,
            };

            match response::parse_response(&raw) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "oracle response malformed, retrying");
                    last_malformed = Some(e);
                }
            }
        }

        // 格式错误优先于超时上报：附最后一次原始输出便于诊断
        Err(last_malformed.unwrap_or(AgentError::OracleTimeout(self.max_retries)))
    }
}
