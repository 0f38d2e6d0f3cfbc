//! Central code import scheduler.
//!
//! Usage:
//!
//! ```text
//! import_scheduler [--config PATH] [-v|-q] serve [--online HOSTNAME]...
//! import_scheduler [--config PATH] machine register|start|stop HOSTNAME [--reason TEXT]
//! import_scheduler [--config PATH] schedule-missing
//! ```
//!
//! `serve` uses the `PostgreSQL` store when `scheduler.database_url` is
//! set and an in-memory store otherwise. The administrative commands need
//! the database.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use codeimport::{
    config::{Config, ConfigError, SchedulerConfig},
    jobs::{
        adapters::{
            memory::InMemoryCodeImportStore, postgres::PostgresCodeImportStore,
            rpc::scheduler_router,
        },
        domain::Hostname,
        ports::CodeImportStore,
        services::{JobWorkflow, MachineAdminService, SchedulerPolicy, SchedulerService},
    },
    telemetry::{VerbosityArgs, init_stderr},
};
use eyre::{Result, WrapErr};
use mockable::DefaultClock;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "import_scheduler", version, about = "Code import scheduler")]
struct Cli {
    /// Configuration file; defaults to `$CODEIMPORT_CONFIG`.
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,
    #[command(flatten)]
    verbosity: VerbosityArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the scheduler RPC surface.
    Serve {
        /// Register HOSTNAME and bring it online at startup.
        #[arg(long = "online", value_name = "HOSTNAME")]
        online: Vec<String>,
    },
    /// Administer worker machines.
    Machine {
        #[command(subcommand)]
        action: MachineAction,
    },
    /// Create jobs for reviewed imports that have none.
    ScheduleMissing,
}

#[derive(Debug, Subcommand)]
enum MachineAction {
    /// Register a machine; it starts offline.
    Register {
        /// Machine hostname.
        hostname: String,
    },
    /// Put a machine into rotation.
    Start {
        /// Machine hostname.
        hostname: String,
        /// Reason recorded with the event.
        #[arg(long)]
        reason: Option<String>,
    },
    /// Drain a machine; it goes offline once idle.
    Stop {
        /// Machine hostname.
        hostname: String,
        /// Reason recorded with the event.
        #[arg(long)]
        reason: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_stderr(cli.verbosity.level())?;
    let config = Config::load(cli.config.as_deref())?.scheduler;

    match cli.command {
        Command::Serve { online } => match config.database_url.clone() {
            Some(url) => serve(connect(url, config.pool_size).await?, &config, &online).await,
            None => {
                tracing::warn!("no scheduler.database_url; serving from memory");
                serve(Arc::new(InMemoryCodeImportStore::new()), &config, &online).await
            }
        },
        Command::Machine { action } => {
            let store = connect(database_url(&config)?, config.pool_size).await?;
            administer(store, action).await
        }
        Command::ScheduleMissing => {
            let store = connect(database_url(&config)?, config.pool_size).await?;
            let summary = JobWorkflow::new(store, Arc::new(DefaultClock))
                .schedule_missing_jobs()
                .await?;
            tracing::info!(
                scheduled = summary.scheduled(),
                skipped = summary.skipped(),
                failed = summary.failed(),
                "scan finished"
            );
            Ok(())
        }
    }
}

fn database_url(config: &SchedulerConfig) -> Result<String, ConfigError> {
    config
        .database_url
        .clone()
        .ok_or(ConfigError::Missing("scheduler.database_url"))
}

async fn connect(url: String, pool_size: u32) -> Result<Arc<PostgresCodeImportStore>> {
    let store = tokio::task::spawn_blocking(move || PostgresCodeImportStore::connect(&url, pool_size))
        .await?
        .wrap_err("failed to connect to the code import database")?;
    Ok(Arc::new(store))
}

async fn serve<S>(store: Arc<S>, config: &SchedulerConfig, online: &[String]) -> Result<()>
where
    S: CodeImportStore + 'static,
{
    let clock = Arc::new(DefaultClock);
    let machines = MachineAdminService::new(Arc::clone(&store), Arc::clone(&clock));
    for name in online {
        let hostname = Hostname::new(name.as_str())?;
        if store.find_machine_by_hostname(&hostname).await?.is_none() {
            machines.register(&hostname).await?;
        }
        machines
            .start(&hostname, Some("brought online at scheduler start".to_owned()))
            .await?;
    }

    let policy = SchedulerPolicy::new(config.branch_base_url.as_str())
        .with_consecutive_failure_limit(config.consecutive_failure_limit);
    let service = Arc::new(SchedulerService::new(store, clock, policy));
    let listener = tokio::net::TcpListener::bind(&config.listen_address)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.listen_address))?;
    tracing::info!(address = %listener.local_addr()?, "scheduler listening");
    axum::serve(listener, scheduler_router(service))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to wait for shutdown signal");
            }
        })
        .await?;
    tracing::info!("scheduler stopped");
    Ok(())
}

async fn administer<S: CodeImportStore>(store: Arc<S>, action: MachineAction) -> Result<()> {
    let machines = MachineAdminService::new(store, Arc::new(DefaultClock));
    let machine = match action {
        MachineAction::Register { hostname } => {
            machines.register(&Hostname::new(hostname)?).await?
        }
        MachineAction::Start { hostname, reason } => {
            machines.start(&Hostname::new(hostname)?, reason).await?
        }
        MachineAction::Stop { hostname, reason } => {
            machines.stop(&Hostname::new(hostname)?, reason).await?
        }
    };
    tracing::info!(hostname = %machine.hostname(), state = %machine.state(), "machine updated");
    Ok(())
}
