//! agenticlaw — Trio agent runtime CLI
//!
//! Usage:
//!   agenticlaw --prompt "..." --non-interactive
//!   agenticlaw --prompt "..." --mode concise --approval autoEdit

use agenticlaw_orchestrator::{
    ApprovalGate, ApprovalMode, AgentSpawner, Coordinator, EchoPlanner, Executor, EventBus,
    LifecycleManager, MemoryScoper, PermissionManager, SecurityMode,
};
use agenticlaw_tools::create_default_registry;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputMode {
    Concise,
    Default,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliApprovalMode {
    Default,
    AutoEdit,
    Yolo,
}

impl From<CliApprovalMode> for ApprovalMode {
    fn from(m: CliApprovalMode) -> Self {
        match m {
            CliApprovalMode::Default => ApprovalMode::Default,
            CliApprovalMode::AutoEdit => ApprovalMode::AutoEdit,
            CliApprovalMode::Yolo => ApprovalMode::Yolo,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "agenticlaw",
    about = "Trio agent runtime — plan, delegate, execute",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// The request to run. Required in --non-interactive mode.
    #[arg(long)]
    prompt: Option<String>,

    /// Run a single turn and exit instead of opening an interactive session.
    #[arg(long, default_value_t = false)]
    non_interactive: bool,

    /// Output verbosity.
    #[arg(long, value_enum, default_value = "default")]
    mode: OutputMode,

    /// Approval policy applied to every tool call this turn.
    #[arg(long, value_enum, default_value = "default")]
    approval: CliApprovalMode,

    /// Verbose tracing to stderr.
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Workspace root tool calls are scoped to.
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Maximum mini-agents running concurrently.
    #[arg(long, default_value_t = 4)]
    max_concurrent_agents: usize,
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "agenticlaw=debug,agenticlaw_orchestrator=debug" } else { "agenticlaw=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if cli.non_interactive && cli.prompt.is_none() {
        eprintln!("error: --non-interactive requires --prompt");
        return ExitCode::from(2);
    }

    let Some(prompt) = cli.prompt.clone() else {
        eprintln!("error: interactive mode is not implemented by this binary; pass --prompt");
        return ExitCode::from(2);
    };

    let workspace = cli.workspace.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let tools = Arc::new(create_default_registry(&workspace));
    let events = Arc::new(EventBus::default());
    let lifecycle = Arc::new(LifecycleManager::new(events.clone()));
    let permissions = Arc::new(PermissionManager::new());
    let approval = Arc::new(ApprovalGate::new(cli.approval.into(), events.clone()));
    let memory = Arc::new(MemoryScoper::default());
    let executor = Arc::new(Executor::new(tools.clone(), approval.clone(), events.clone(), cli.max_concurrent_agents));

    let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") else {
        eprintln!("error: ANTHROPIC_API_KEY not set");
        return ExitCode::from(1);
    };
    let provider = Arc::new(agenticlaw_llm::AnthropicProvider::new(&api_key));
    let spawner = Arc::new(AgentSpawner::new(
        provider,
        tools,
        lifecycle.clone(),
        permissions,
        approval,
        events,
        cli.max_concurrent_agents,
        "claude-sonnet-4-20250514",
    ));

    let coordinator = Coordinator::new(Arc::new(EchoPlanner), executor, spawner, memory, true);
    let session_id = uuid::Uuid::new_v4().to_string();
    let run_permissions = SecurityMode::Default.defaults();

    let outcome = tokio::select! {
        result = coordinator.execute(&prompt, &session_id, run_permissions) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("cancelled");
            lifecycle.shutdown();
            return ExitCode::from(130);
        }
    };

    match outcome {
        Ok(result) => {
            match cli.mode {
                OutputMode::Concise => println!("{}", result.response),
                OutputMode::Default => {
                    println!("strategy: {:?} (complexity={:.2}, parallelizability={:.2})", result.strategy, result.score.complexity, result.score.parallelizability);
                    println!("{}", result.response);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}
