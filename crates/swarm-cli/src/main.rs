//! llm-swarm — run a swarm of LLM inference servers on a cluster.
//!
//! Submits the jobs, waits until they answer, prints the endpoint to use,
//! then holds the swarm until Ctrl-C and releases it.
//!
//! # Usage
//!
//! ```text
//! llm-swarm --config swarm.toml --instances 4
//! RUST_LOG=debug llm-swarm --job-scheduler runai --inference-engine vllm
//! ```

mod args;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use swarm_controller::SwarmController;
use swarm_core::{CommandRunner, SwarmConfig, SystemRunner};
use swarm_health::HttpProbe;

use crate::args::SwarmArgs;

#[derive(Parser)]
#[command(
    name = "llm-swarm",
    about = "Provision LLM inference servers on Slurm or Run:ai and serve them behind one endpoint",
    version
)]
struct Cli {
    #[command(flatten)]
    swarm: SwarmArgs,

    /// Print the effective configuration as TOML, without the token, and exit.
    #[arg(long)]
    print_config: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = cli.swarm.into_config()?;
    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    run(config).await
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,llm_swarm=debug,swarm=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: SwarmConfig) -> anyhow::Result<()> {
    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Collaborators ──────────────────────────────────────────

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let backend = swarm_scheduler::create_backend(&config, runner.clone());
    let prober = Arc::new(HttpProbe::new(
        config.inference_engine,
        config.probe_timeout()?,
    ));

    info!(
        scheduler = %config.job_scheduler,
        engine = %config.inference_engine,
        instances = config.instances,
        model = %config.model,
        "starting swarm"
    );
    let controller = SwarmController::new(config, backend, runner, prober, shutdown_rx.clone())?;
    let mut session = controller.start().await?;

    println!("endpoint: {}", session.endpoint());
    println!(
        "suggested max parallel requests: {}",
        session.suggested_max_parallel_requests()
    );
    info!("swarm is serving; press Ctrl-C to release");

    let mut shutdown = shutdown_rx;
    let _ = shutdown.wait_for(|stop| *stop).await;

    session.release().await;
    Ok(())
}
