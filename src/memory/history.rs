//! 跨会话任务历史
//!
//! save 将任务、计划与观察落盘（每任务一个 JSON 文件）；
//! find_similar 按目标文本检索相似历史任务，供规划提示词注入「历史经验」段落。
//! 相似度为分词后的词重叠（jieba 处理中英文混合），无向量库依赖。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use jieba_rs::Jieba;
use serde::{Deserialize, Serialize};

use crate::core::Task;
use crate::memory::Observation;

/// 全局 Jieba 实例（延迟初始化）
static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

/// 中英文混合分词：含 CJK 用 jieba 搜索模式，否则按空白切分
fn tokenize(text: &str) -> HashSet<String> {
    let text = text.trim();
    if text.is_empty() {
        return HashSet::new();
    }
    if text.chars().any(is_cjk) {
        JIEBA
            .get_or_init(Jieba::new)
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.to_lowercase())
            .filter(|s| s.chars().count() > 1 || s.chars().next().map(is_cjk).unwrap_or(false))
            .collect()
    } else {
        text.split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 1)
            .collect()
    }
}

/// 一次已完成任务的存档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: Task,
    pub success: bool,
    /// 失败时的结构化原因（成功为 None）
    pub failure_reason: Option<String>,
    /// 各步骤描述（审计与经验复用）
    pub step_descriptions: Vec<String>,
    pub observations: Vec<Observation>,
    pub finished_at: DateTime<Utc>,
}

/// 相似历史任务（find_similar 的返回项）
#[derive(Debug, Clone)]
pub struct SimilarTask {
    pub goal: String,
    pub success: bool,
    pub failure_reason: Option<String>,
    /// 词重叠数（越大越相似）
    pub overlap: usize,
}

/// 历史存储接口：核心只依赖这两个操作，格式归实现所有
pub trait HistoryStore: Send + Sync {
    fn save(&self, record: &TaskRecord) -> anyhow::Result<()>;

    fn find_similar(&self, goal: &str, top_k: usize) -> Vec<SimilarTask>;
}

/// 目录内每任务一个 JSON 文件的实现
pub struct JsonHistoryStore {
    dir: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl HistoryStore for JsonHistoryStore {
    fn save(&self, record: &TaskRecord) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("task_{}.json", record.task.id));
        std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
        tracing::debug!(path = %path.display(), "task record saved");
        Ok(())
    }

    fn find_similar(&self, goal: &str, top_k: usize) -> Vec<SimilarTask> {
        let query_tokens = tokenize(goal);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut scored: Vec<SimilarTask> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(data) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(record) = serde_json::from_str::<TaskRecord>(&data) else {
                // 损坏的存档跳过，不影响检索
                tracing::warn!(path = %path.display(), "skipping unreadable task record");
                continue;
            };

            let overlap = tokenize(&record.task.goal)
                .intersection(&query_tokens)
                .count();
            if overlap > 0 {
                scored.push(SimilarTask {
                    goal: record.task.goal.clone(),
                    success: record.success,
                    failure_reason: record.failure_reason.clone(),
                    overlap,
                });
            }
        }

        scored.sort_by(|a, b| b.overlap.cmp(&a.overlap));
        scored.truncate(top_k);
        scored
    }
}

/// 未配置历史目录时的空实现
#[derive(Default)]
pub struct NoopHistoryStore;

impl HistoryStore for NoopHistoryStore {
    fn save(&self, _record: &TaskRecord) -> anyhow::Result<()> {
        Ok(())
    }

    fn find_similar(&self, _goal: &str, _top_k: usize) -> Vec<SimilarTask> {
        Vec::new()
    }
}

/// 历史经验段落：注入规划提示词（失败原因优先展示，避免重蹈覆辙）
pub fn render_similar_section(similar: &[SimilarTask]) -> String {
    if similar.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n## Historical Experience\n\nSimilar past tasks (avoid repeating mistakes):\n");
    for (i, task) in similar.iter().enumerate() {
        let goal: String = task.goal.chars().take(200).collect();
        out.push_str(&format!("{}. {}\n", i + 1, goal));
        match (&task.failure_reason, task.success) {
            (Some(reason), _) => {
                let reason: String = reason.chars().take(200).collect();
                out.push_str(&format!("   Failed: {}\n", reason));
            }
            (None, true) => out.push_str("   Succeeded\n"),
            (None, false) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskMode;
    use tempfile::TempDir;

    fn record(goal: &str, success: bool, failure: Option<&str>) -> TaskRecord {
        TaskRecord {
            task: Task::new(goal, TaskMode::Hybrid),
            success,
            failure_reason: failure.map(String::from),
            step_descriptions: vec!["step one".to_string()],
            observations: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_find_similar() {
        let dir = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(dir.path());

        store.save(&record("deploy flask service to docker", true, None)).unwrap();
        store
            .save(&record("fix cargo build error", false, Some("missing dependency")))
            .unwrap();

        let similar = store.find_similar("deploy the flask app", 3);
        assert_eq!(similar.len(), 1);
        assert!(similar[0].goal.contains("flask"));
        assert!(similar[0].success);
    }

    #[test]
    fn test_failure_reason_surfaces() {
        let dir = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(dir.path());
        store
            .save(&record("fix cargo build error", false, Some("missing dependency")))
            .unwrap();

        let similar = store.find_similar("cargo build fails", 3);
        assert_eq!(similar[0].failure_reason.as_deref(), Some("missing dependency"));

        let section = render_similar_section(&similar);
        assert!(section.contains("missing dependency"));
    }

    #[test]
    fn test_cjk_goal_tokenized() {
        let dir = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(dir.path());
        store.save(&record("部署 flask 服务到 docker", true, None)).unwrap();

        let similar = store.find_similar("部署服务", 3);
        assert!(!similar.is_empty());
    }

    #[test]
    fn test_missing_dir_returns_empty() {
        let store = JsonHistoryStore::new("/nonexistent/history/dir");
        assert!(store.find_similar("anything", 3).is_empty());
    }

    #[test]
    fn test_top_k_ordering() {
        let dir = TempDir::new().unwrap();
        let store = JsonHistoryStore::new(dir.path());
        store.save(&record("build rust project with cargo", true, None)).unwrap();
        store.save(&record("build project", true, None)).unwrap();
        store.save(&record("unrelated web scraping", true, None)).unwrap();

        let similar = store.find_similar("build rust project", 1);
        assert_eq!(similar.len(), 1);
        assert!(similar[0].goal.contains("cargo"));
    }
}
