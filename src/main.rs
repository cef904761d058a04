//! Hive 命令行入口
//!
//! 以 UI 刷新循环的方式轮询控制器事件并打印；收到交互请求时从 stdin 读取回复，
//! 带着返回的对话与回合序号重新启动运行。Ctrl+C 请求停止（在下一回合开始前生效）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hive::config::load_config;
use hive::llm::MockLlmClient;
use hive::memory::Message;
use hive::{AgentController, AgentEvent, ToolRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};

/// 单次事件轮询的等待上限
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "hive", about = "hive - tool-using conversational agent", version)]
struct Cli {
    /// Extra TOML config file (applied after config/default.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Model identifier, overrides [llm].model.
    #[arg(long)]
    model: Option<String>,
    /// Maximum model calls per run, overrides [agent].max_turns.
    #[arg(long)]
    max_turns: Option<usize>,
    /// Use the offline mock LLM (echoes the query).
    #[arg(long)]
    mock: bool,
    /// The question or task for the agent.
    query: String,
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::Turn {
            turn,
            content,
            tool_calls,
            usage,
            ..
        } => {
            if !content.trim().is_empty() {
                println!("[turn {turn}] {content}");
            }
            for call in tool_calls {
                println!("[turn {turn}] {}({}) -> {}", call.name, call.raw_arguments, call.result);
            }
            println!(
                "[turn {turn}] tokens: +{}/+{} (total {}/{})",
                usage.input, usage.output, usage.total_input, usage.total_output
            );
        }
        AgentEvent::Final { content, .. } => println!("\n{content}"),
        AgentEvent::Stopped { turn, .. } => println!("[stopped at turn {turn}]"),
        AgentEvent::MaxTurns { turn, .. } => println!("[max turns reached at turn {turn}]"),
        AgentEvent::UserInteractionRequested { prompt, .. } => println!("\n? {prompt}"),
        AgentEvent::Error { message, trace } => {
            eprintln!("error: {message}");
            tracing::debug!(%trace, "agent error trace");
        }
        AgentEvent::WorkerFinished => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_deref()).context("Failed to load config")?;
    let workspace = cfg.workspace_root();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace {}", workspace.display()))?;

    let mut controller = AgentController::new(ToolRegistry::standard(&workspace));
    if cli.mock {
        controller = controller.with_llm(Arc::new(MockLlmClient::new()));
    }

    let mut base = cfg.agent_config();
    if let Some(model) = cli.model {
        base = base.with_model(model);
    }
    if let Some(max_turns) = cli.max_turns {
        base = base.with_max_turns(max_turns);
    }

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut query = cli.query;
    let mut config = base.clone();
    let mut failed = false;

    loop {
        controller.start(query.clone(), config.clone())?;
        let mut resume: Option<(Vec<Message>, usize)> = None;

        loop {
            let event = tokio::select! {
                ev = controller.get_event(true, Some(POLL_INTERVAL)) => ev,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("stop requested");
                    controller.stop();
                    continue;
                }
            };
            let Some(event) = event else {
                continue;
            };
            print_event(&event);
            match event {
                AgentEvent::UserInteractionRequested { history, turn, .. } => {
                    resume = Some((history, turn));
                }
                AgentEvent::Error { .. } => failed = true,
                AgentEvent::WorkerFinished => break,
                _ => {}
            }
        }

        let Some((history, turn)) = resume else {
            break;
        };
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout()).ok();
        let Some(reply) = stdin.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        query = reply;
        config = base.clone().resumed(history, turn);
    }

    if failed {
        anyhow::bail!("agent run failed");
    }
    Ok(())
}
