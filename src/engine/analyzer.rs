//! 任务分析：Oracle 判定复杂度/不确定性并选择执行模式
//!
//! 只影响探索与规划深度，不影响正确性；分析失败回退 hybrid。

use std::sync::Arc;

use crate::oracle::{prompts, Oracle, OracleResponse, TaskAnalysis};

pub async fn analyze(oracle: &Arc<dyn Oracle>, goal: &str, similar_section: &str) -> TaskAnalysis {
    let messages = prompts::analysis_messages(goal, similar_section);
    match oracle.propose(&messages).await {
        Ok(OracleResponse::Analysis(analysis)) => analysis,
        Ok(other) => {
            tracing::warn!(?other, "analyzer got non-analysis response, defaulting to hybrid");
            TaskAnalysis::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "task analysis failed, defaulting to hybrid");
            TaskAnalysis::default()
        }
    }
}
