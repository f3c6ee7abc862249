//! 交互确认
//!
//! confirm(description, risk) 返回是否放行；终端实现带超时，
//! 超时按拒绝处理，保证无人值守的任务不会无限阻塞进程。

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::safety::RiskScore;

/// 确认接口：由执行循环在风险门控要求确认时调用
#[async_trait]
pub trait ConfirmProvider: Send + Sync {
    async fn confirm(&self, description: &str, risk: &RiskScore) -> bool;
}

/// 终端确认：stdin 读一行，超时默认拒绝
pub struct TerminalConfirm {
    timeout: Duration,
}

impl TerminalConfirm {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl ConfirmProvider for TerminalConfirm {
    async fn confirm(&self, description: &str, risk: &RiskScore) -> bool {
        println!(
            "\n[confirm] {} (risk {} / {})",
            description,
            risk.value,
            risk.level.as_str()
        );
        print!("Proceed? [y/N]: ");
        let _ = std::io::stdout().flush();

        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        });

        match tokio::time::timeout(self.timeout, read).await {
            Ok(Ok(Ok(line))) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            // 超时 / 读取失败 / 任务被取消：一律按拒绝处理
            _ => {
                println!("(no answer, rejecting)");
                false
            }
        }
    }
}

/// 全部放行（--yes 运行与测试用）
#[derive(Default)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmProvider for AutoApprove {
    async fn confirm(&self, _description: &str, _risk: &RiskScore) -> bool {
        true
    }
}

/// 脚本化确认（测试用）：按顺序弹出预置决定，耗尽后拒绝
pub struct ScriptedConfirm {
    decisions: Mutex<VecDeque<bool>>,
}

impl ScriptedConfirm {
    pub fn new(decisions: Vec<bool>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ConfirmProvider for ScriptedConfirm {
    async fn confirm(&self, _description: &str, _risk: &RiskScore) -> bool {
        self.decisions.lock().unwrap().pop_front().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::RiskLevel;

    fn risk() -> RiskScore {
        RiskScore {
            value: 50,
            level: RiskLevel::Medium,
        }
    }

    #[tokio::test]
    async fn test_auto_approve() {
        assert!(AutoApprove.confirm("anything", &risk()).await);
    }

    #[tokio::test]
    async fn test_scripted_sequence_then_reject() {
        let confirm = ScriptedConfirm::new(vec![true, false]);
        assert!(confirm.confirm("first", &risk()).await);
        assert!(!confirm.confirm("second", &risk()).await);
        // 耗尽后默认拒绝
        assert!(!confirm.confirm("third", &risk()).await);
    }
}
