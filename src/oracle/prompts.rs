//! Oracle 提示词构造
//!
//! 各阶段（分析 / 探索 / 规划 / 重规划）的 system + user 消息在此拼装；
//! 响应格式用 JSON 说明 + Schema 提示约束，解析由 response 模块负责。

use crate::llm::Message;
use crate::oracle::response::plan_schema_json;
use crate::plan::Step;

/// 分析阶段：判定复杂度/不确定性并推荐模式
pub fn analysis_messages(goal: &str, similar_section: &str) -> Vec<Message> {
    let system = r#"You are the task analyzer of a terminal agent. Classify the task and pick an execution mode.

Modes:
- "fast": 1-3 deterministic steps, no environment uncertainty
- "hybrid": needs a plan with verification, some uncertainty
- "exploratory": unclear goal or unknown environment, needs reconnaissance first

Respond with exactly one JSON object:
{"type": "analysis", "complexity": "trivial|simple|medium|complex", "uncertainty": "low|medium|high", "estimated_steps": 3, "mode": "fast|hybrid|exploratory", "reasoning": "..."}"#;

    let user = format!("Task: {}\n{}", goal, similar_section);
    vec![Message::system(system), Message::user(user)]
}

/// 探索阶段：给出下一个只读工具调用，或宣布信息已足够
pub fn exploration_messages(
    goal: &str,
    tool_descriptions: &str,
    findings: &str,
    observations_section: &str,
) -> Vec<Message> {
    let system = format!(
        r#"You are the reconnaissance phase of a terminal agent. You may ONLY use read-only tools to gather information; never modify anything.

Available read-only tools:
{}

Respond with exactly one JSON object, either:
{{"type": "explore", "tool": "tool_name", "params": {{...}}, "reasoning": "..."}}
or, once you know enough to plan:
{{"type": "findings_sufficient", "summary": "what you learned"}}"#,
        tool_descriptions
    );

    let user = format!(
        "Goal: {}\n\nFindings so far:\n{}\n\nObservations:\n{}",
        goal,
        if findings.is_empty() { "(none)" } else { findings },
        observations_section
    );
    vec![Message::system(system), Message::user(user)]
}

/// 规划阶段：目标 + 探索发现 + 工作记忆 + 历史经验 → 有序计划
pub fn planning_messages(
    goal: &str,
    tool_descriptions: &str,
    findings: &str,
    working_section: &str,
    similar_section: &str,
) -> Vec<Message> {
    let system = format!(
        r#"You are the planner of a terminal agent. Produce an ordered execution plan.

Available tools:
{}

Guidelines:
1. Keep it simple: 2-5 concrete steps, merge related actions.
2. Use EXACT parameter names from the tool descriptions.
3. Attach a verification to steps whose effect can be checked
   ("verify": {{"kind": "file_exists", "path": "..."}} or {{"kind": "output_contains", "value": "..."}} or {{"kind": "exit_code_zero"}}).
4. Do not repeat work that is already done according to the working memory.

Respond with exactly one JSON object:
{{"type": "plan", "goal": "...", "steps": [{{"id": 1, "description": "...", "tool": "...", "params": {{...}}, "verify": {{...}}}}]}}

Plan schema:
{}"#,
        tool_descriptions,
        plan_schema_json()
    );

    let mut user = format!("Task: {}\n", goal);
    if !findings.is_empty() {
        user.push_str(&format!("\nExploration findings:\n{}\n", findings));
    }
    if !working_section.is_empty() {
        user.push_str(&format!("\n{}\n", working_section));
    }
    if !similar_section.is_empty() {
        user.push_str(similar_section);
    }
    vec![Message::system(system), Message::user(user)]
}

/// 重规划阶段：失败步骤 + 错误 + 未执行尾部 → 修订后的尾部
pub fn replanning_messages(
    goal: &str,
    tool_descriptions: &str,
    failed_step: &Step,
    failure_reason: &str,
    remaining: &[Step],
    working_section: &str,
    observations_section: &str,
) -> Vec<Message> {
    let system = format!(
        r#"You are the replanner of a terminal agent. A step failed; produce a revised tail for the plan.

Available tools:
{}

Rules:
- Steps that already succeeded are NEVER revisited; plan only the remaining work.
- Fix the failure first, then complete what is left.
- Do not repeat the exact failing call unchanged.

Respond with exactly one JSON object:
{{"type": "replan", "steps": [{{"id": 1, "description": "...", "tool": "...", "params": {{...}}, "verify": {{...}}}}]}}"#,
        tool_descriptions
    );

    let remaining_text = if remaining.is_empty() {
        "(none)".to_string()
    } else {
        remaining
            .iter()
            .map(|s| format!("- step {}: {} ({})", s.id, s.description, s.tool))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let user = format!(
        "Goal: {}\n\nFailed step {} ({}): {}\nFailure: {}\n\nRemaining unexecuted steps:\n{}\n\n{}\n\nObservations:\n{}",
        goal,
        failed_step.id,
        failed_step.tool,
        failed_step.description,
        failure_reason,
        remaining_text,
        working_section,
        observations_section
    );
    vec![Message::system(system), Message::user(user)]
}
