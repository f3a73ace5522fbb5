//! Command-line front end for the task orchestrator.
//!
//! Run with: `orchestrator run --prompt "..." --workspace ./work`
//! Diagnose the decomposition heuristic with: `orchestrator should-decompose --prompt "..."`

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use conductor_orchestrator::{Model, Orchestrator, Phase, RuntimeEvent};
use conductor_resilience::health::{ComponentHealth, HealthCheckable, HealthStatus, SystemHealthCheck};
use conductor_resilience::shutdown::ShutdownCoordinator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "orchestrator", about = "Decompose and execute a coding task across supervised sub-agents")]
struct Cli {
    /// Minimum log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Override the concurrency ceiling used under normal resource pressure.
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Name of the sub-agent CLI binary to spawn (e.g. "claude").
    #[arg(long, global = true, default_value = "claude")]
    subagent_binary: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one submission end-to-end and print the synthesis result to stdout.
    Run {
        /// The natural-language task to decompose and execute.
        #[arg(long)]
        prompt: String,
        /// Model the commander itself runs under (drives sub-task and synthesis calls).
        #[arg(long, value_enum, default_value_t = ModelArg::Sonnet)]
        model: ModelArg,
        /// Shared working directory every sub-agent process runs against.
        #[arg(long)]
        workspace: PathBuf,
        /// Maximum turns a single sub-agent invocation is allowed.
        #[arg(long, default_value_t = 50)]
        max_turns: u32,
    },
    /// Print the `should_decompose` heuristic's verdict for a prompt, without running it.
    ShouldDecompose {
        #[arg(long)]
        prompt: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Opus,
    Sonnet,
    Haiku,
}

impl From<ModelArg> for Model {
    fn from(value: ModelArg) -> Self {
        match value {
            ModelArg::Opus => Self::Opus,
            ModelArg::Sonnet => Self::Sonnet,
            ModelArg::Haiku => Self::Haiku,
        }
    }
}

struct WorkspaceHealthCheck {
    workspace: PathBuf,
}

#[async_trait::async_trait]
impl HealthCheckable for WorkspaceHealthCheck {
    async fn check_health(&self) -> ComponentHealth {
        match std::fs::metadata(&self.workspace) {
            Ok(meta) if meta.is_dir() => ComponentHealth::healthy("workspace directory is writable"),
            Ok(_) => ComponentHealth::unhealthy("workspace path exists but is not a directory"),
            Err(err) => ComponentHealth::unhealthy(format!("workspace unreachable: {err}")),
        }
    }

    fn component_name(&self) -> &str {
        "workspace"
    }
}

struct SubAgentBinaryHealthCheck {
    binary: String,
}

#[async_trait::async_trait]
impl HealthCheckable for SubAgentBinaryHealthCheck {
    async fn check_health(&self) -> ComponentHealth {
        match which_binary(&self.binary) {
            Some(path) => ComponentHealth::healthy(format!("resolved {} at {}", self.binary, path.display())),
            None => ComponentHealth::unhealthy(format!("{} not found on PATH", self.binary)),
        }
    }

    fn component_name(&self) -> &str {
        "subagent_binary"
    }
}

fn which_binary(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::ShouldDecompose { prompt } => {
            println!("{}", Orchestrator::should_decompose(&prompt));
            Ok(())
        }
        Command::Run {
            prompt,
            model,
            workspace,
            max_turns,
        } => run(&cli.subagent_binary, cli.max_concurrency, prompt, model.into(), workspace, max_turns).await,
    }
}

async fn run(
    subagent_binary: &str,
    max_concurrency: Option<usize>,
    prompt: String,
    model: Model,
    workspace: PathBuf,
    max_turns: u32,
) -> Result<()> {
    if let Some(limit) = max_concurrency {
        info!(limit, "max-concurrency override requested (informational; pressure tiers still gate admission)");
    }

    let mut health_registry = SystemHealthCheck::new();
    health_registry.add_check(Arc::new(WorkspaceHealthCheck {
        workspace: workspace.clone(),
    }));
    health_registry.add_check(Arc::new(SubAgentBinaryHealthCheck {
        binary: subagent_binary.to_string(),
    }));
    let startup = health_registry.check_all().await;
    for (name, health) in &startup {
        if health.status != HealthStatus::Healthy {
            warn!(component = %name, message = %health.message, "startup health check degraded");
        }
    }

    let shutdown = ShutdownCoordinator::new(Duration::from_secs(10));
    let mut shutdown_rx = shutdown.subscribe();

    let (mut orchestrator, mut events_rx) = Orchestrator::new(subagent_binary, max_turns);
    let commander_id = orchestrator
        .submit(prompt, model, workspace, Utc::now())
        .context("failed to submit task for decomposition")?;
    info!(commander = %commander_id, "submission accepted");

    let mut monitor_interval = tokio::time::interval(Duration::from_secs(10));
    monitor_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut reap_interval = tokio::time::interval(Duration::from_millis(250));
    reap_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if orchestrator
            .orchestration(commander_id)
            .is_some_and(|o| o.phase.is_terminal())
        {
            break;
        }

        tokio::select! {
            Some(event) = events_rx.recv() => {
                if let Err(err) = orchestrator.handle_event(event, Utc::now()) {
                    error!(error = %err, "failed to handle runtime event");
                }
            }
            _ = reap_interval.tick() => {
                orchestrator.poll_exited().await;
            }
            _ = monitor_interval.tick() => {
                let (report, alerts) = orchestrator.monitor_tick(Utc::now());
                for alert in alerts {
                    warn!(?alert, "monitor alert");
                }
                let _ = report;
            }
            _ = shutdown_rx.recv() => {
                warn!("shutdown requested; cancelling in-flight orchestration");
                orchestrator.cancel(commander_id, Utc::now());
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("ctrl-c received; cancelling in-flight orchestration");
                orchestrator.cancel(commander_id, Utc::now());
                break;
            }
        }
    }

    match orchestrator.orchestration(commander_id) {
        Some(orchestration) if orchestration.phase == Phase::Completed => {
            println!("{}", orchestration.synthesis_result.as_deref().unwrap_or(""));
            Ok(())
        }
        Some(orchestration) => {
            anyhow::bail!(
                "orchestration did not complete (phase {:?}): {}",
                orchestration.phase,
                orchestration.synthesis_result.as_deref().unwrap_or("no result")
            )
        }
        None => anyhow::bail!("commander {commander_id} vanished from orchestrator state"),
    }
}

fn init_tracing(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("orchestrator={log_level},conductor_orchestrator={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
    Ok(())
}
