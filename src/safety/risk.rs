//! 风险评分
//!
//! score(tool, params) 为纯函数：相同输入必得相同 RiskScore。
//! 分段约定：只读 0-30，写入/提交 31-60，删除/强制 61-90，黑名单命中 91-100（不可执行）。
//! 门控动作由分数、只读属性与自动放行上限共同决定。

use serde_json::Value;

use crate::config::SafetySection;
use crate::safety::Blacklist;

/// 风险等级（由阈值配置划分）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// 一次评分结果：数值 + 等级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskScore {
    pub value: u8,
    pub level: RiskLevel,
}

impl RiskScore {
    /// critical（黑名单区间）不可执行，确认也无法放行
    pub fn is_executable(&self) -> bool {
        self.level != RiskLevel::Critical
    }
}

/// 门控动作：直接执行 / 交互确认 / 拒绝执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Execute,
    Confirm,
    Block,
}

/// 只读工具集合：结果不改变任何外部状态，可自动放行
const READ_ONLY_TOOLS: &[&str] = &[
    "read_file",
    "list_files",
    "file_tree",
    "search_files",
    "git_status",
    "git_diff",
    "git_log",
    "docker_ps",
    "docker_logs",
    "http_request",
];

pub fn is_read_only_tool(name: &str) -> bool {
    READ_ONLY_TOOLS.contains(&name)
}

/// 各工具基准分；execute_command 在此基础上按命令文本细化
fn tool_base_score(name: &str) -> u8 {
    match name {
        "read_file" | "list_files" | "file_tree" | "search_files" => 10,
        "git_status" | "git_diff" | "git_log" => 10,
        "docker_ps" | "docker_logs" => 10,
        "http_request" => 25,
        "write_file" | "edit_file" => 50,
        "git_add" | "git_commit" => 50,
        "execute_command" => 60,
        "git_push" => 70,
        // 未知工具按中风险处理
        _ => 50,
    }
}

/// 命令文本分段正则（按顺序求值，后组覆盖前组）
struct CommandPatterns {
    readonly: Vec<regex::Regex>,
    write: Vec<regex::Regex>,
    high_git: Vec<regex::Regex>,
    delete: Vec<regex::Regex>,
    system: Vec<regex::Regex>,
}

fn compile_all(sources: &[&str]) -> Vec<regex::Regex> {
    sources
        .iter()
        .filter_map(|s| regex::Regex::new(&format!("(?i){}", s)).ok())
        .collect()
}

impl CommandPatterns {
    fn new() -> Self {
        Self {
            readonly: compile_all(&[
                r"^(ls|cat|less|more|head|tail|grep|find|which|whereis|pwd|wc|env|uname)(\s|$)",
                r"^git\s+(status|log|diff|show)(\s|$)",
                r"^git\s+branch\s*$",
                r"^docker\s+(ps|images|inspect|logs|stats)(\s|$)",
            ]),
            write: compile_all(&[
                r"^(echo|touch|mkdir|cp|mv)\s",
                r"^git\s+(add|commit|stash)(\s|$)",
                r"^docker\s+(run|start|stop)\s",
            ]),
            high_git: compile_all(&[
                r"^git\s+push(\s|$)",
                r"^git\s+pull(\s|$)",
                r"^git\s+checkout\s",
                r"^git\s+branch\s.*(-[dD]|--delete)",
            ]),
            delete: compile_all(&[r"\brm\b", r"\brmdir\b", r"^git\s+(reset|clean)\s", r"^docker\s+(rm|rmi|prune)\s"]),
            system: compile_all(&[
                r"^sudo\s",
                r"\bchmod\b",
                r"\bchown\b",
                r"\bkill\b",
                r"\bpkill\b",
                r"^(apt|yum|dnf|brew|choco)\s+(install|remove|purge)",
            ]),
        }
    }
}

/// 风险评分器：持有阈值配置与黑名单，score 无副作用
pub struct RiskScorer {
    thresholds: (u8, u8, u8),
    auto_approve_ceiling: u8,
    blacklist: Blacklist,
    patterns: CommandPatterns,
}

impl RiskScorer {
    pub fn new(cfg: &SafetySection) -> Self {
        Self {
            thresholds: (cfg.threshold_low, cfg.threshold_medium, cfg.threshold_high),
            auto_approve_ceiling: cfg.auto_approve_ceiling,
            blacklist: Blacklist::new(&cfg.blacklist_custom),
            patterns: CommandPatterns::new(),
        }
    }

    /// 对一次工具调用评分；相同 (tool, params) 永远得到相同结果
    pub fn score(&self, tool_name: &str, params: &Value) -> RiskScore {
        let mut value = tool_base_score(tool_name);

        match tool_name {
            "execute_command" => {
                if let Some(cmd) = params.get("command").and_then(|v| v.as_str()) {
                    value = self.score_command(cmd);
                }
            }
            "git_push" => {
                let force = params.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
                if force {
                    let branch = params.get("branch").and_then(|v| v.as_str()).unwrap_or("");
                    // 保护分支强推进入黑名单区间
                    if matches!(branch, "main" | "master") {
                        value = 95;
                    } else {
                        value = 85;
                    }
                }
            }
            "write_file" | "edit_file" => {
                // 覆盖系统路径的写入升档
                if let Some(path) = params.get("path").and_then(|v| v.as_str()) {
                    if path.starts_with("/etc") || path.starts_with("/usr") || path.starts_with("/boot") {
                        value = value.max(75);
                    }
                }
            }
            _ => {}
        }

        self.build(value)
    }

    /// 命令文本评分（execute_command 参数）：分段正则 + 强制/递归标志升档
    fn score_command(&self, command: &str) -> u8 {
        if self.blacklist.check(command).is_some() {
            return 95;
        }

        for re in &self.patterns.readonly {
            if re.is_match(command) {
                return 10;
            }
        }

        let mut score: u8 = 40;
        for re in &self.patterns.write {
            if re.is_match(command) {
                score = 50;
            }
        }
        for re in &self.patterns.high_git {
            if re.is_match(command) {
                score = 70;
            }
        }
        for re in &self.patterns.delete {
            if re.is_match(command) {
                score = 75;
            }
        }
        for re in &self.patterns.system {
            if re.is_match(command) {
                score = 85;
            }
        }

        if command.contains("--force") || command.split_whitespace().any(|t| t == "-f") {
            score = score.max(80).saturating_add(5).min(90);
        }
        if command.contains("-rf") || command.contains("-fr") {
            score = score.max(85);
        }
        if command.contains('|') || command.contains('>') {
            score = score.saturating_add(5).min(90);
        }

        score
    }

    fn build(&self, value: u8) -> RiskScore {
        let (low, medium, high) = self.thresholds;
        let level = if value <= low {
            RiskLevel::Low
        } else if value <= medium {
            RiskLevel::Medium
        } else if value <= high {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        };
        RiskScore { value, level }
    }

    /// 门控决策：critical 一律拒绝；只读且低于放行上限直接执行；其余交互确认
    pub fn gate(&self, tool_name: &str, score: &RiskScore) -> GateAction {
        if !score.is_executable() {
            return GateAction::Block;
        }
        if is_read_only_tool(tool_name) && score.value <= self.auto_approve_ceiling {
            return GateAction::Execute;
        }
        GateAction::Confirm
    }
}
