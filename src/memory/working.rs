//! 工作记忆：单任务的工具调用账本与循环检测
//!
//! 由执行循环在每次工具调用后写入，归属唯一 Task，不跨任务共享。
//! 循环判定依据「完全相同的动作」（工具+参数 / 逐字节相同的命令），
//! 单纯的频次不构成证据：多目标任务会合法地重复同类操作。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// 单文件读取次数超过该值判定循环
const FILE_READ_LIMIT: usize = 3;
/// 非豁免工具的总调用上限
const TOOL_USE_LIMIT: u32 = 10;
/// 规则 3 的滑动窗口：最近 5 次读取
const READ_WINDOW: usize = 5;

/// 豁免频次规则的工具：每个不同目标合法调用一次，总次数不说明问题
const EXEMPT_TOOLS: &[&str] = &[
    "execute_command",
    "write_file",
    "edit_file",
    "search_files",
    "read_file",
    "list_files",
    "git_add",
    "git_commit",
];

/// 一条命令执行记录
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub command: String,
    pub at: DateTime<Utc>,
    pub success: bool,
}

/// 尝试签名：工具名 + 规范化参数序列化，仅用于相等性比较
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptSignature {
    pub tool: String,
    pub params: String,
}

impl AttemptSignature {
    pub fn new(tool: &str, params: &Value) -> Self {
        Self {
            tool: tool.to_string(),
            params: canonicalize(params),
        }
    }
}

/// 递归按键名排序后序列化，保证等价参数得到相同签名
fn canonicalize(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<_, _> =
                    map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// 工作记忆：追加写入，计数永不回退，任务结束即丢弃
#[derive(Debug, Default)]
pub struct WorkingMemory {
    /// 各工具累计调用次数
    tools_used: HashMap<String, u32>,
    /// 读取过的文件（保序，含重复）
    files_read: Vec<String>,
    /// 写入过的文件（保序去重）
    files_written: Vec<String>,
    /// 执行过的命令
    commands_run: Vec<CommandRecord>,
    /// 检出循环的累计次数
    loop_count: u32,
    /// 规则 4 窗口：3 常规 / 5 低容忍
    command_repeat_window: usize,
}

impl WorkingMemory {
    pub fn new(command_repeat_window: usize) -> Self {
        Self {
            command_repeat_window: command_repeat_window.clamp(2, 5),
            ..Self::default()
        }
    }

    /// 记录一次工具调用；read/write/command 分别落入对应账本
    pub fn record(&mut self, tool_name: &str, params: &Value, success: bool) {
        *self.tools_used.entry(tool_name.to_string()).or_insert(0) += 1;

        match tool_name {
            "read_file" => {
                if let Some(path) = params.get("path").and_then(|v| v.as_str()) {
                    self.files_read.push(path.to_string());
                }
            }
            "write_file" | "edit_file" => {
                if let Some(path) = params.get("path").and_then(|v| v.as_str()) {
                    if !self.files_written.iter().any(|p| p == path) {
                        self.files_written.push(path.to_string());
                    }
                }
            }
            "execute_command" => {
                if let Some(cmd) = params.get("command").and_then(|v| v.as_str()) {
                    self.commands_run.push(CommandRecord {
                        command: cmd.to_string(),
                        at: Utc::now(),
                        success,
                    });
                }
            }
            _ => {}
        }
    }

    /// 循环检测：规则按序求值，首个命中即返回；对相同状态重复调用结果不变
    pub fn detect_loop(&self) -> Option<String> {
        // 规则 1：单文件读取超过 3 次
        let mut read_counts: HashMap<&str, usize> = HashMap::new();
        for path in &self.files_read {
            *read_counts.entry(path.as_str()).or_insert(0) += 1;
        }
        if let Some((path, count)) = read_counts
            .iter()
            .filter(|(_, &c)| c > FILE_READ_LIMIT)
            .max_by_key(|(_, &c)| c)
        {
            return Some(format!("file '{}' read {} times", path, count));
        }

        // 规则 2：非豁免工具总次数超限
        if let Some((tool, count)) = self
            .tools_used
            .iter()
            .filter(|(name, _)| !EXEMPT_TOOLS.contains(&name.as_str()))
            .filter(|(_, &c)| c > TOOL_USE_LIMIT)
            .max_by_key(|(_, &c)| c)
        {
            return Some(format!("tool '{}' used {} times", tool, count));
        }

        // 规则 3：最近 5 次读取在至多 2 个文件间震荡，且最高频文件出现 >= 3 次
        if self.files_read.len() >= READ_WINDOW {
            let window = &self.files_read[self.files_read.len() - READ_WINDOW..];
            let mut window_counts: HashMap<&str, usize> = HashMap::new();
            for path in window {
                *window_counts.entry(path.as_str()).or_insert(0) += 1;
            }
            let max_repeat = window_counts.values().copied().max().unwrap_or(0);
            if window_counts.len() <= 2 && max_repeat >= 3 {
                return Some(format!(
                    "oscillating between same files: {:?}",
                    window_counts.keys().collect::<Vec<_>>()
                ));
            }
        }

        // 规则 4：最近 N 条命令逐字节相同
        let window = self.command_repeat_window.max(2);
        if self.commands_run.len() >= window {
            let recent = &self.commands_run[self.commands_run.len() - window..];
            let first = &recent[0].command;
            if recent.iter().all(|r| &r.command == first) {
                return Some(format!("identical command repeated {} times: {}", window, first));
            }
        }

        None
    }

    pub fn note_loop(&mut self) {
        self.loop_count += 1;
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn tool_count(&self, tool: &str) -> u32 {
        self.tools_used.get(tool).copied().unwrap_or(0)
    }

    pub fn files_read(&self) -> &[String] {
        &self.files_read
    }

    pub fn files_written(&self) -> &[String] {
        &self.files_written
    }

    pub fn commands_run(&self) -> &[CommandRecord] {
        &self.commands_run
    }

    /// 供规划/重规划提示词使用的状态段落
    pub fn to_prompt_section(&self) -> String {
        let mut out = String::from("## Working Memory\n\n");

        out.push_str(&format!("Files read ({} total): ", self.files_read.len()));
        if self.files_read.is_empty() {
            out.push_str("none\n");
        } else {
            let recent: Vec<&str> = self
                .files_read
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|s| s.as_str())
                .collect();
            out.push_str(&recent.join(", "));
            out.push('\n');
        }

        out.push_str(&format!("Files written ({} total): ", self.files_written.len()));
        if self.files_written.is_empty() {
            out.push_str("none\n");
        } else {
            out.push_str(&self.files_written.join(", "));
            out.push('\n');
        }

        out.push_str(&format!("Commands executed ({} total):\n", self.commands_run.len()));
        for record in self.commands_run.iter().rev().take(3).rev() {
            let status = if record.success { "ok" } else { "failed" };
            let cmd: String = record.command.chars().take(60).collect();
            out.push_str(&format!("  [{}] {}\n", status, cmd));
        }

        if !self.tools_used.is_empty() {
            let mut stats: Vec<(&String, &u32)> = self.tools_used.iter().collect();
            stats.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            out.push_str("Tool usage: ");
            let parts: Vec<String> = stats
                .iter()
                .take(5)
                .map(|(name, count)| format!("{}={}", name, count))
                .collect();
            out.push_str(&parts.join(", "));
            out.push('\n');
        }

        out
    }

    /// 终局统计（完成/中止报告用）
    pub fn stats(&self) -> WorkingMemoryStats {
        WorkingMemoryStats {
            files_read: self.files_read.len(),
            files_written: self.files_written.len(),
            commands_run: self.commands_run.len(),
            tool_calls: self.tools_used.values().sum(),
            loops_detected: self.loop_count,
        }
    }
}

/// 任务结束时的汇总计数
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct WorkingMemoryStats {
    pub files_read: usize,
    pub files_written: usize,
    pub commands_run: usize,
    pub tool_calls: u32,
    pub loops_detected: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wm() -> WorkingMemory {
        WorkingMemory::new(3)
    }

    #[test]
    fn test_signature_canonical_order() {
        let a = AttemptSignature::new("read_file", &json!({"path": "a.rs", "limit": 10}));
        let b = AttemptSignature::new("read_file", &json!({"limit": 10, "path": "a.rs"}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_writes_not_a_loop() {
        // 10 个不同文件各写一次：多目标任务，不是循环
        let mut m = wm();
        for name in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"] {
            m.record("write_file", &json!({"path": format!("{}.py", name), "content": "x"}), true);
        }
        assert_eq!(m.detect_loop(), None);
    }

    #[test]
    fn test_file_read_four_times_is_loop() {
        let mut m = wm();
        for _ in 0..4 {
            m.record("read_file", &json!({"path": "src/main.rs"}), true);
        }
        let reason = m.detect_loop().expect("loop");
        assert!(reason.contains("src/main.rs"));
        assert!(reason.contains("read 4 times"));
    }

    #[test]
    fn test_three_reads_not_yet_a_loop() {
        let mut m = wm();
        for _ in 0..3 {
            m.record("read_file", &json!({"path": "src/main.rs"}), true);
        }
        assert_eq!(m.detect_loop(), None);
    }

    #[test]
    fn test_non_exempt_tool_overuse() {
        let mut m = wm();
        for i in 0..11 {
            m.record("docker_logs", &json!({"container": format!("c{}", i)}), true);
        }
        let reason = m.detect_loop().expect("loop");
        assert!(reason.contains("docker_logs"));
        assert!(reason.contains("11 times"));
    }

    #[test]
    fn test_exempt_tool_heavy_use_allowed() {
        let mut m = wm();
        for i in 0..20 {
            m.record("execute_command", &json!({"command": format!("echo {}", i)}), true);
        }
        assert_eq!(m.detect_loop(), None);
    }

    #[test]
    fn test_oscillating_reads() {
        // a b a b a：窗口内 2 个文件，a 出现 3 次
        let mut m = wm();
        for path in ["a.rs", "b.rs", "a.rs", "b.rs", "a.rs"] {
            m.record("read_file", &json!({"path": path}), true);
        }
        let reason = m.detect_loop().expect("loop");
        assert!(reason.contains("oscillating"));
    }

    #[test]
    fn test_identical_command_three_times() {
        let mut m = wm();
        for _ in 0..3 {
            m.record("execute_command", &json!({"command": "ls -la"}), true);
        }
        let reason = m.detect_loop().expect("loop");
        assert!(reason.contains("identical command"));
        assert!(reason.contains("3 times"));
        assert!(reason.contains("ls -la"));
    }

    #[test]
    fn test_varied_commands_not_a_loop() {
        let mut m = wm();
        for cmd in ["ls -la", "ls -la", "pwd"] {
            m.record("execute_command", &json!({"command": cmd}), true);
        }
        assert_eq!(m.detect_loop(), None);
    }

    #[test]
    fn test_detect_loop_idempotent() {
        let mut m = wm();
        for _ in 0..3 {
            m.record("execute_command", &json!({"command": "ls -la"}), true);
        }
        let first = m.detect_loop();
        let second = m.detect_loop();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wider_window_tolerates_three() {
        // 低容忍窗口 = 5：3 次相同还不算循环
        let mut m = WorkingMemory::new(5);
        for _ in 0..3 {
            m.record("execute_command", &json!({"command": "cargo test"}), false);
        }
        assert_eq!(m.detect_loop(), None);
        for _ in 0..2 {
            m.record("execute_command", &json!({"command": "cargo test"}), false);
        }
        assert!(m.detect_loop().is_some());
    }

    #[test]
    fn test_prompt_section_mentions_counts() {
        let mut m = wm();
        m.record("read_file", &json!({"path": "a.rs"}), true);
        m.record("write_file", &json!({"path": "b.rs", "content": "x"}), true);
        let section = m.to_prompt_section();
        assert!(section.contains("Files read (1 total)"));
        assert!(section.contains("b.rs"));
    }
}
