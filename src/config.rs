//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MANTIS__*` 覆盖（双下划线表示嵌套，
//! 如 `MANTIS__ORACLE__MODEL=deepseek-chat`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub oracle: OracleSection,
    pub safety: SafetySection,
    pub tools: ToolsSection,
    pub engine: EngineSection,
    pub context: ContextSection,
    pub history: HistorySection,
}

/// [app] 段：工作目录沙箱
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱根目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
}

/// [oracle] 段：后端、模型与重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    /// OpenAI 兼容端点；None 时用官方默认
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// 单次请求超时（秒）
    #[serde(default = "default_oracle_timeout")]
    pub request_timeout_secs: u64,
    /// 超时/格式错误的本地重试上限
    #[serde(default = "default_oracle_retries")]
    pub max_retries: u32,
    /// 指数退避基数（毫秒）：第 n 次重试前等待 base * 2^n
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_oracle_timeout() -> u64 {
    60
}

fn default_oracle_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
            request_timeout_secs: default_oracle_timeout(),
            max_retries: default_oracle_retries(),
            backoff_base_ms: default_backoff_ms(),
        }
    }
}

/// [safety] 段：风险阈值、自动放行与确认策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    /// score <= low 为低风险
    #[serde(default = "default_threshold_low")]
    pub threshold_low: u8,
    /// score <= medium 为中风险
    #[serde(default = "default_threshold_medium")]
    pub threshold_medium: u8,
    /// score <= high 为高风险，超过为 critical
    #[serde(default = "default_threshold_high")]
    pub threshold_high: u8,
    /// 只读调用风险分低于该值时免交互确认
    #[serde(default = "default_auto_approve")]
    pub auto_approve_ceiling: u8,
    /// 确认等待超时（秒），超时按拒绝处理
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    /// 追加到内建黑名单的自定义毁灭性模式（正则）
    #[serde(default)]
    pub blacklist_custom: Vec<String>,
}

fn default_threshold_low() -> u8 {
    30
}

fn default_threshold_medium() -> u8 {
    60
}

fn default_threshold_high() -> u8 {
    90
}

fn default_auto_approve() -> u8 {
    30
}

fn default_confirm_timeout() -> u64 {
    120
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            threshold_low: default_threshold_low(),
            threshold_medium: default_threshold_medium(),
            threshold_high: default_threshold_high(),
            auto_approve_ceiling: default_auto_approve(),
            confirm_timeout_secs: default_confirm_timeout(),
            blacklist_custom: Vec::new(),
        }
    }
}

/// [tools] 段：工具执行限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    /// shell 白名单命令（首词）
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    /// 工具输出超过该字符数时截断并追加标记
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
    /// http_request 允许的域名
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
}

fn default_tool_timeout() -> u64 {
    300
}

fn default_max_output_chars() -> usize {
    20_000
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "cat", "head", "tail", "wc", "grep", "find", "which", "echo",
        "mkdir", "touch", "cp", "mv", "pwd", "env", "ps", "df", "uname",
        "git", "docker", "cargo", "python", "python3", "pip", "npm", "node",
        "make", "curl",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        "github.com".into(),
        "raw.githubusercontent.com".into(),
        "docs.rs".into(),
        "crates.io".into(),
        "doc.rust-lang.org".into(),
        "docs.python.org".into(),
        "pypi.org".into(),
        "stackoverflow.com".into(),
        "developer.mozilla.org".into(),
        "localhost".into(),
        "127.0.0.1".into(),
    ]
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            allowed_commands: default_allowed_commands(),
            max_output_chars: default_max_output_chars(),
            allowed_domains: default_allowed_domains(),
        }
    }
}

/// [engine] 段：状态机的可调参数（阈值无原理推导，全部外置）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 连续失败多少步后转入重规划
    #[serde(default = "default_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// 探索阶段步数上限（exploratory 模式翻倍）
    #[serde(default = "default_explore_steps")]
    pub explore_max_steps: u32,
    /// 空计划重试上限，超过即 PlanningEmpty
    #[serde(default = "default_plan_attempts")]
    pub max_plan_attempts: u32,
    /// 重规划轮数上限
    #[serde(default = "default_replan_rounds")]
    pub max_replan_rounds: u32,
    /// 相同命令连续出现多少次判定循环（3 = 常规，5 = 低容忍）
    #[serde(default = "default_command_repeat_window")]
    pub command_repeat_window: usize,
}

fn default_consecutive_failures() -> u32 {
    2
}

fn default_explore_steps() -> u32 {
    8
}

fn default_plan_attempts() -> u32 {
    3
}

fn default_replan_rounds() -> u32 {
    3
}

fn default_command_repeat_window() -> usize {
    3
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_consecutive_failures(),
            explore_max_steps: default_explore_steps(),
            max_plan_attempts: default_plan_attempts(),
            max_replan_rounds: default_replan_rounds(),
            command_repeat_window: default_command_repeat_window(),
        }
    }
}

/// [context] 段：观察日志压缩参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// 压缩后的观察条数上限
    #[serde(default = "default_max_observations")]
    pub max_observations: usize,
    /// 始终保留的最近条数
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
}

fn default_max_observations() -> usize {
    30
}

fn default_keep_recent() -> usize {
    5
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_observations: default_max_observations(),
            keep_recent: default_keep_recent(),
        }
    }
}

/// [history] 段：跨会话任务历史（可选）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    /// 历史存储目录；未设置时不启用
    pub dir: Option<PathBuf>,
    /// find_similar 返回条数
    #[serde(default = "default_similar_top_k")]
    pub similar_top_k: usize,
}

fn default_similar_top_k() -> usize {
    3
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            dir: None,
            similar_top_k: default_similar_top_k(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MANTIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MANTIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MANTIS")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_consecutive_failures, 2);
        assert_eq!(cfg.engine.max_plan_attempts, 3);
        assert_eq!(cfg.context.keep_recent, 5);
        assert_eq!(cfg.safety.threshold_high, 90);
        assert!(cfg.tools.allowed_commands.contains(&"git".to_string()));
        assert!(cfg.history.dir.is_none());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let cfg = load_config(None).expect("defaults should load");
        assert_eq!(cfg.oracle.max_retries, 3);
        assert_eq!(cfg.engine.command_repeat_window, 3);
    }
}
