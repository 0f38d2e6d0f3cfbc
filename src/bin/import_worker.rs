//! Runs one code import job.
//!
//! Usage:
//!
//! ```text
//! import_worker <JOB_ID> --log-file PATH [-v…|-q…] [--config PATH]
//! ```
//!
//! Logs go to the log file, whose tail is reported with each heartbeat.
//! The exit code reflects the reported status: 0 success, 1 failure or
//! abandoned, 2 no change, 3 partial, 4 invalid, 5 unsupported,
//! 6 forbidden and 7 remote broken.

use camino::Utf8PathBuf;
use clap::Parser;
use codeimport::{
    branch_store::{FilesystemBranchStore, LeaseManager},
    config::{Config, WorkerConfig},
    jobs::{adapters::rpc::HttpSchedulerClient, domain::JobId},
    telemetry::{VerbosityArgs, init_log_file},
    worker::{
        FilesystemLogArtifactStore, ImportWorker, TokioCommandRunner, WorkerCollaborators,
        WorkerSettings, report_setup_failure,
    },
};
use eyre::Result;
use std::{process::ExitCode, sync::Arc};

#[derive(Debug, Parser)]
#[command(name = "import_worker", version, about = "Code import worker")]
struct Cli {
    /// Job to run.
    job_id: i64,
    /// File receiving this worker's log.
    #[arg(long)]
    log_file: Utf8PathBuf,
    /// Configuration file; defaults to `$CODEIMPORT_CONFIG`.
    #[arg(long)]
    config: Option<Utf8PathBuf>,
    #[command(flatten)]
    verbosity: VerbosityArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_log_file(cli.verbosity.level(), &cli.log_file)?;
    let config = Config::load(cli.config.as_deref())?.worker;
    let job_id = JobId::new(cli.job_id)?;

    let scheduler = Arc::new(HttpSchedulerClient::new(
        config.scheduler_url.as_str(),
        config.rpc_timeout(),
    )?);
    let (branches, artifacts, leases) = match open_stores(&config) {
        Ok(stores) => stores,
        Err(err) => return Err(report_setup_failure(scheduler.as_ref(), job_id, err).await),
    };
    let collaborators = WorkerCollaborators {
        scheduler,
        branches: Arc::new(branches),
        runner: Arc::new(TokioCommandRunner),
        artifacts: Arc::new(artifacts),
        leases: Arc::new(leases),
    };
    let settings = WorkerSettings {
        job_id,
        log_file: cli.log_file,
        scratch_root: config.scratch_root.clone(),
        branch_base_url: config.branch_base_url.clone(),
        heartbeat_interval: config.heartbeat_interval(),
    };
    let outcome = ImportWorker::new(collaborators, settings).run().await?;
    tracing::info!(job_id = %job_id, ?outcome, "worker exiting");
    Ok(ExitCode::from(outcome.exit_code()))
}

fn open_stores(
    config: &WorkerConfig,
) -> Result<(FilesystemBranchStore, FilesystemLogArtifactStore, LeaseManager)> {
    Ok((
        FilesystemBranchStore::open(&config.branch_store_root)?,
        FilesystemLogArtifactStore::open(&config.artifact_dir)?,
        LeaseManager::open(&config.lease_dir)?,
    ))
}
