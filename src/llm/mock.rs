//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预置响应，可模拟空计划、格式错误、失败等场景。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 脚本化客户端：每次 complete 弹出一条预置响应；耗尽后重复最后一条
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    /// 记录收到的请求数
    calls: Mutex<u32>,
}

impl MockLlm {
    pub fn with_responses(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        *self.calls.lock().unwrap() += 1;
        let mut queue = self.responses.lock().unwrap();
        match queue.pop_front() {
            Some(response) => {
                *self.last.lock().unwrap() = Some(response.clone());
                Ok(response)
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| "mock exhausted".to_string()),
        }
    }
}
