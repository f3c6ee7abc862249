//! Mantis - Rust 终端任务智能体
//!
//! 入口：解析目标与模式参数，装配引擎并驱动到终态；
//! 观察日志流式打印到终端，Succeeded 退出码 0，Aborted 非 0。

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use mantis::config::load_config;
use mantis::confirm::{AutoApprove, ConfirmProvider, TerminalConfirm};
use mantis::core::TaskMode;
use mantis::engine::{EngineEvent, TaskEngine};
use mantis::llm::OpenAiClient;
use mantis::memory::{HistoryStore, JsonHistoryStore, NoopHistoryStore};
use mantis::oracle::LlmOracle;
use mantis::tools::{default_registry, ToolDispatcher};

struct CliArgs {
    goal: String,
    mode: Option<TaskMode>,
    yes: bool,
    config_path: Option<std::path::PathBuf>,
}

fn print_usage() {
    eprintln!("Usage: mantis [--mode fast|hybrid|exploratory] [--yes] [--config FILE] \"<goal>\"");
}

fn parse_args() -> Option<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut goal_parts: Vec<String> = Vec::new();
    let mut mode = None;
    let mut yes = false;
    let mut config_path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args.next()?;
                mode = Some(TaskMode::parse(&value));
            }
            "--yes" | "-y" => yes = true,
            "--config" => config_path = Some(std::path::PathBuf::from(args.next()?)),
            "--help" | "-h" => return None,
            other => goal_parts.push(other.to_string()),
        }
    }

    if goal_parts.is_empty() {
        return None;
    }
    Some(CliArgs {
        goal: goal_parts.join(" "),
        mode,
        yes,
        config_path,
    })
}

fn render_event(event: &EngineEvent) {
    match event {
        EngineEvent::Phase { name } => println!("== {} ==", name),
        EngineEvent::Analysis {
            complexity,
            uncertainty,
            mode,
        } => println!("analysis: complexity={} uncertainty={} mode={}", complexity, uncertainty, mode),
        EngineEvent::ExploreStep { tool, preview } => {
            let line: String = preview.lines().next().unwrap_or("").chars().take(100).collect();
            println!("  explore {} -> {}", tool, line);
        }
        EngineEvent::ExploreSubstituted { from, to } => {
            println!("  explore: repeated {} substituted with {}", from, to);
        }
        EngineEvent::ExploreDone {
            steps,
            loops_avoided,
            narrowed,
        } => println!("  explored {} steps ({} loops avoided, {} narrowed)", steps, loops_avoided, narrowed),
        EngineEvent::PlanReady { steps } => {
            println!("plan:");
            for line in steps {
                println!("  {}", line);
            }
        }
        EngineEvent::StepStart {
            index,
            total,
            description,
            tool,
            ..
        } => println!("[{}/{}] {} ({})", index, total, description, tool),
        EngineEvent::RiskWarning { tool, score, level } => {
            println!("  ! high risk: {} (score {}, {})", tool, score, level);
        }
        EngineEvent::StepResult { outcome, preview, .. } => {
            if preview.is_empty() {
                println!("  -> {}", outcome);
            } else {
                println!("  -> {}: {}", outcome, preview);
            }
        }
        EngineEvent::LoopWarning { reason } => println!("  ! loop detected: {}", reason),
        EngineEvent::Replanning { round, reason } => {
            println!("replanning (round {}): {}", round, reason);
        }
        EngineEvent::Succeeded { stats } => {
            println!(
                "task succeeded ({} tool calls, {} files written, {} commands)",
                stats.tool_calls, stats.files_written, stats.commands_run
            );
        }
        EngineEvent::Aborted { reason, .. } => println!("task aborted: {}", reason),
        EngineEvent::Error { text } => eprintln!("error: {}", text),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mantis::observability::init();

    let Some(args) = parse_args() else {
        print_usage();
        std::process::exit(2);
    };

    let config = load_config(args.config_path.clone()).context("Failed to load config")?;

    let workspace_root = config
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    std::fs::create_dir_all(&workspace_root).context("Failed to create workspace root")?;

    let registry = default_registry(&workspace_root, &config.tools);
    let dispatcher = Arc::new(ToolDispatcher::new(
        registry,
        config.tools.timeout_secs,
        config.tools.max_output_chars,
    ));

    let llm = Arc::new(OpenAiClient::new(
        config.oracle.base_url.as_deref(),
        &config.oracle.model,
        None,
    ));
    let oracle = Arc::new(LlmOracle::new(llm, &config.oracle));

    let confirm: Arc<dyn ConfirmProvider> = if args.yes {
        Arc::new(AutoApprove)
    } else {
        Arc::new(TerminalConfirm::new(config.safety.confirm_timeout_secs))
    };

    let history: Arc<dyn HistoryStore> = match &config.history.dir {
        Some(dir) => Arc::new(JsonHistoryStore::new(dir)),
        None => Arc::new(NoopHistoryStore),
    };

    // Ctrl-C -> 协作式取消：步骤之间与 Oracle 调用前后生效
    let cancel_token = CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupt received, cancelling after current step...");
                cancel_token.cancel();
            }
        });
    }

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let renderer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            render_event(&event);
        }
    });

    let engine = TaskEngine::new(
        config,
        oracle,
        dispatcher,
        confirm,
        history,
        &workspace_root,
        cancel_token,
        Some(event_tx),
    );

    let report = engine.run(&args.goal, args.mode).await;
    // 引擎持有事件发送端；先释放，渲染任务才能在通道收尾后退出
    drop(engine);
    let _ = renderer.await;

    if report.success {
        Ok(())
    } else {
        if let Some(reason) = &report.reason {
            eprintln!("aborted: {}", reason);
            for obs in &report.trail {
                eprintln!("  {}", obs.render());
            }
        }
        std::process::exit(1);
    }
}
