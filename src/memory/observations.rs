//! 观察日志与上下文压缩
//!
//! Observation 一经创建不可变；ContextManager 保留全量历史供审计，
//! 压缩只作用于「提供给 Oracle 的视图」：critical 永不丢弃，最近 keep_recent 条
//! 永远保留，中段按步长均匀采样，合并后按 iteration 升序输出。

use serde::{Deserialize, Serialize};

use crate::config::ContextSection;

/// 观察类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    ToolResult,
    CommandResult,
    Error,
    Rejection,
    Success,
    Info,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::ToolResult => "tool_result",
            ObservationKind::CommandResult => "command_result",
            ObservationKind::Error => "error",
            ObservationKind::Rejection => "rejection",
            ObservationKind::Success => "success",
            ObservationKind::Info => "info",
        }
    }
}

/// 一条观察记录：创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub content: String,
    pub kind: ObservationKind,
    /// 所属迭代序号，压缩后按此排序保持时间线
    pub iteration: usize,
    pub is_critical: bool,
}

impl Observation {
    pub fn new(content: impl Into<String>, kind: ObservationKind, iteration: usize) -> Self {
        // 错误与用户拒绝自动标记 critical
        let is_critical = matches!(kind, ObservationKind::Error | ObservationKind::Rejection);
        Self {
            content: content.into(),
            kind,
            iteration,
            is_critical,
        }
    }

    /// 渲染为上下文行
    pub fn render(&self) -> String {
        if self.is_critical {
            format!("CRITICAL [{}] {}", self.kind.as_str(), self.content)
        } else {
            format!("[{}] {}", self.kind.as_str(), self.content)
        }
    }
}

/// 压缩算法（纯函数）：critical 全保留，recent 全保留，中段步长采样
///
/// `|critical| + |recent| >= max_size` 时直接返回这两组（超出 max_size 但受保护类无损）。
/// 输出长度 <= max(max_size, |critical| + |recent|)，且按 iteration 升序。
pub fn compress(observations: &[Observation], max_size: usize, keep_recent: usize) -> Vec<Observation> {
    if observations.len() <= max_size {
        return observations.to_vec();
    }

    let recent_start = observations.len().saturating_sub(keep_recent);

    let mut critical: Vec<Observation> = Vec::new();
    let mut recent: Vec<Observation> = Vec::new();
    let mut middle: Vec<Observation> = Vec::new();

    for (idx, obs) in observations.iter().enumerate() {
        if obs.is_critical {
            critical.push(obs.clone());
        } else if idx >= recent_start {
            recent.push(obs.clone());
        } else {
            middle.push(obs.clone());
        }
    }

    let protected = critical.len() + recent.len();
    let mut selected = critical;
    selected.extend(recent);

    if protected < max_size {
        let budget = max_size - protected;
        if middle.len() > budget {
            // 均匀步长采样，保持相对顺序
            let step = middle.len() / budget;
            selected.extend(middle.into_iter().step_by(step.max(1)).take(budget));
        } else {
            selected.extend(middle);
        }
    }

    selected.sort_by_key(|obs| obs.iteration);
    selected
}

/// 上下文管理器：一个 Task 独占一份；追加观察并维护迭代序号
#[derive(Debug)]
pub struct ContextManager {
    observations: Vec<Observation>,
    current_iteration: usize,
    config: ContextSection,
}

impl ContextManager {
    pub fn new(config: ContextSection) -> Self {
        Self {
            observations: Vec::new(),
            current_iteration: 0,
            config,
        }
    }

    /// 追加一条观察（用当前迭代序号）
    pub fn add(&mut self, content: impl Into<String>, kind: ObservationKind) {
        self.observations
            .push(Observation::new(content, kind, self.current_iteration));
    }

    /// 记录用户拒绝（critical，重规划时 Oracle 可见）
    pub fn add_rejection(&mut self, description: &str) {
        self.add(format!("User rejected: {}", description), ObservationKind::Rejection);
    }

    pub fn next_iteration(&mut self) {
        self.current_iteration += 1;
    }

    pub fn iteration(&self) -> usize {
        self.current_iteration
    }

    /// 全量历史（审计用，不受压缩影响）
    pub fn all(&self) -> &[Observation] {
        &self.observations
    }

    /// 压缩视图：供下一次 Oracle 调用
    pub fn compressed(&self) -> Vec<Observation> {
        compress(&self.observations, self.config.max_observations, self.config.keep_recent)
    }

    /// 渲染为提示词中的观察段落
    pub fn to_prompt_section(&self) -> String {
        let view = self.compressed();
        if view.is_empty() {
            return "No previous observations.".to_string();
        }
        view.iter()
            .enumerate()
            .map(|(i, obs)| format!("{}. {}", i + 1, obs.render()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn critical_count(&self) -> usize {
        self.observations.iter().filter(|o| o.is_critical).count()
    }
}
