//! 验证器：按 Planner 给出的判据评估单步结果
//!
//! 判据在 Step.verify 里；评估是纯函数，连续失败计数由状态机维护。

use std::path::Path;

use crate::plan::VerifySpec;
use crate::tools::ToolResult;

/// 评估一步的结果；Ok(()) 为通过，Err 带失败原因
pub fn verify(spec: &VerifySpec, result: &ToolResult, workspace_root: &Path) -> Result<(), String> {
    match spec {
        VerifySpec::ToolSuccess => {
            if result.success {
                Ok(())
            } else {
                Err(result
                    .error
                    .clone()
                    .unwrap_or_else(|| "tool reported failure".to_string()))
            }
        }
        VerifySpec::ExitCodeZero => {
            let code = result.metadata.get("exit_code").and_then(|v| v.as_i64());
            match code {
                Some(0) => Ok(()),
                Some(code) => Err(format!("exit code {}", code)),
                None => Err("no exit_code in result metadata".to_string()),
            }
        }
        VerifySpec::OutputContains { value } => {
            if result.output.contains(value.as_str()) {
                Ok(())
            } else {
                Err(format!("output does not contain '{}'", value))
            }
        }
        VerifySpec::FileExists { path } => {
            let full = workspace_root.join(path);
            if full.exists() {
                Ok(())
            } else {
                Err(format!("expected file '{}' does not exist", path))
            }
        }
    }
}
