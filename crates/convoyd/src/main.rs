//! convoyd — the Convoy daemon.
//!
//! Single binary that assembles the orchestration components:
//! - State store (redb)
//! - Deploy orchestrator + stability waits
//! - Autoscaling decision engine
//! - Node lifecycle manager
//! - Leader-gated capacity poller
//!
//! Inbound cloud notifications are read as newline-delimited JSON on
//! stdin until the HTTP front door lands.
//!
//! # Usage
//!
//! ```text
//! convoyd run --data-dir /var/lib/convoy --load-balancer edge --domain example.com
//! ```

mod intake;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use convoy_autoscale::{AutoscaleConfig, CapacityPoller, DecisionEngine};
use convoy_deploy::{DeployConfig, LogNotifier, Orchestrator, TaskRegistry};
use convoy_lifecycle::{LifecycleConfig, LifecycleManager};
use convoy_state::StateStore;
use tokio::io::BufReader;
use tracing::info;

use crate::intake::Intake;

#[derive(Parser)]
#[command(name = "convoyd", about = "Convoy deployment daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator, autoscaler, and lifecycle manager.
    Run {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/convoy")]
        data_dir: PathBuf,

        /// Load balancer whose listeners carry service rules.
        #[arg(long, default_value = "convoy")]
        load_balancer: String,

        /// DNS domain for hostname rule conditions.
        #[arg(long, default_value = "")]
        domain: String,

        /// Capacity sweep interval in seconds.
        #[arg(long, default_value = "60")]
        sweep_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,convoyd=debug,convoy=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            data_dir,
            load_balancer,
            domain,
            sweep_interval,
        } => run(data_dir, load_balancer, domain, sweep_interval).await,
    }
}

async fn run(
    data_dir: PathBuf,
    load_balancer: String,
    domain: String,
    sweep_interval: u64,
) -> anyhow::Result<()> {
    info!("Convoy daemon starting");

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("convoy.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // No adapter is wired yet; deployments swap in an implementation
    // of `CloudProvider` against their cloud's APIs. The no-op
    // provider keeps the daemon inert rather than panicking.
    let cloud = Arc::new(convoy_cloud::noop::NoopCloud);

    let orchestrator = Orchestrator::new(
        store.clone(),
        cloud.clone(),
        Arc::new(LogNotifier),
        DeployConfig {
            domain,
            ..DeployConfig::default()
        },
    );
    let resumed = orchestrator.resume()?;
    info!(resumed, %load_balancer, "deploy orchestrator ready");

    let tasks = Arc::new(TaskRegistry::default());
    let lifecycle = LifecycleManager::new(
        store.clone(),
        cloud.clone(),
        tasks.clone(),
        LifecycleConfig::default(),
    );
    let redrained = lifecycle.resume().await?;
    info!(resumed = redrained, "lifecycle manager ready");

    let config = AutoscaleConfig {
        sweep_interval: Duration::from_secs(sweep_interval),
        ..AutoscaleConfig::default()
    };
    let engine = DecisionEngine::new(store.clone(), cloud.clone(), tasks, config.clone());
    let poller = CapacityPoller::new(store, cloud, config);
    info!(holder = %poller.holder_id(), "capacity poller ready");

    let intake = Intake::new(engine, lifecycle);
    let stdin = BufReader::new(tokio::io::stdin());

    tokio::select! {
        _ = poller.run() => {}
        _ = intake.run(stdin) => info!("notification stream closed"),
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    info!("Convoy daemon stopped");
    Ok(())
}
