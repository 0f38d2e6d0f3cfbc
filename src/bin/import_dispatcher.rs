//! Runs one dispatch cycle for this host.
//!
//! Usage:
//!
//! ```text
//! import_dispatcher [-v…|-q…] [--hostname NAME] [--config PATH]
//! ```
//!
//! Intended to run periodically, e.g. from cron. Each run claims at most
//! one job and starts a detached `import_worker` for it.

use camino::Utf8PathBuf;
use clap::Parser;
use codeimport::{
    config::Config,
    dispatcher::{Dispatcher, DispatcherSettings, ProcessWorkerLauncher},
    jobs::{
        adapters::{postgres::PostgresCodeImportStore, rpc::HttpSchedulerClient},
        domain::Hostname,
    },
    telemetry::{VerbosityArgs, init_stderr},
};
use eyre::{Result, WrapErr};
use mockable::DefaultClock;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "import_dispatcher", version, about = "Code import dispatcher")]
struct Cli {
    /// Hostname the machine is registered under; defaults to the OS name.
    #[arg(long)]
    hostname: Option<String>,
    /// Configuration file; defaults to `$CODEIMPORT_CONFIG`.
    #[arg(long)]
    config: Option<Utf8PathBuf>,
    #[command(flatten)]
    verbosity: VerbosityArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_stderr(cli.verbosity.level())?;
    let config = Config::load(cli.config.as_deref())?.dispatcher;

    let name = match cli.hostname.or_else(|| config.hostname.clone()) {
        Some(name) => name,
        None => os_hostname()?,
    };
    let hostname = Hostname::new(name)?;

    let database_url = config.database_url()?.to_owned();
    let store = tokio::task::spawn_blocking(move || PostgresCodeImportStore::connect(&database_url, 1))
        .await?
        .wrap_err("failed to connect to the code import database")?;
    let scheduler = HttpSchedulerClient::new(config.scheduler_url.as_str(), config.rpc_timeout())?;
    let base_launcher =
        ProcessWorkerLauncher::new(config.worker_program.clone(), config.log_dir.clone());
    let launcher = match &cli.config {
        Some(path) => base_launcher.with_args(["--config", path.as_str()]),
        None => base_launcher,
    };

    let dispatcher = Dispatcher::new(
        Arc::new(store),
        Arc::new(DefaultClock),
        Arc::new(scheduler),
        launcher,
        DispatcherSettings {
            hostname,
            worker_limit: config.worker_limit,
            max_local_jobs: config.max_local_jobs,
        },
    );
    let outcome = dispatcher.run_cycle().await?;
    tracing::info!(?outcome, "dispatch cycle finished");
    Ok(())
}

#[cfg(unix)]
fn os_hostname() -> Result<String> {
    nix::unistd::gethostname()
        .wrap_err("failed to read the OS hostname")?
        .into_string()
        .map_err(|raw| eyre::eyre!("OS hostname is not UTF-8: {raw:?}"))
}

#[cfg(not(unix))]
fn os_hostname() -> Result<String> {
    Err(eyre::eyre!("pass --hostname on this platform"))
}
