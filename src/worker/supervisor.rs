//! The import worker: runs one job from import data to reported result.

use super::{
    artifacts::LogArtifactStore,
    command::CommandRunner,
    fetch::{FetchError, FetchOutcome, Fetcher, strategy_for},
    log_tail::{read_log, read_log_tail},
};
use crate::{
    branch_store::{
        BranchStore, BranchStoreError, ImportBranchRef, LeaseError, LeaseManager, PullOutcome,
        filesystem::open_or_create,
    },
    jobs::{
        domain::{ImportSourceDetails, JobDomainError, JobId, JobResultStatus, LogArtifactId, LogTail},
        ports::{ImportData, SchedulerClient, SchedulerRpcError},
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::oneshot, time::MissedTickBehavior};

/// Per-job worker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Job to run.
    pub job_id: JobId,
    /// Log file written by this worker; heartbeat tails come from here.
    pub log_file: Utf8PathBuf,
    /// Directory holding per-job scratch space.
    pub scratch_root: Utf8PathBuf,
    /// Base URL branch URLs are resolved against.
    pub branch_base_url: String,
    /// Time between heartbeats.
    pub heartbeat_interval: Duration,
}

/// Services the worker talks to.
pub struct WorkerCollaborators<S, B, R, A> {
    /// Scheduler RPC client.
    pub scheduler: Arc<S>,
    /// Branch store holding the mirrors.
    pub branches: Arc<B>,
    /// Runner for VCS tools.
    pub runner: Arc<R>,
    /// Destination for the worker log.
    pub artifacts: Arc<A>,
    /// Leases serialising access to a mirror.
    pub leases: Arc<LeaseManager>,
}

/// How a worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The result was reported to the scheduler.
    Finished(JobResultStatus),
    /// The job was reclaimed or vanished; nothing was reported.
    Abandoned,
}

impl WorkerOutcome {
    /// Returns the process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Finished(status) => status.exit_code(),
            Self::Abandoned => JobResultStatus::Failure.exit_code(),
        }
    }
}

/// Failure inside an import, reported to the scheduler as a job status.
#[derive(Debug, Clone, Error)]
pub enum ImportFailure {
    /// The worker arguments could not be decoded.
    #[error(transparent)]
    Arguments(#[from] JobDomainError),
    /// The branch store refused or failed.
    #[error(transparent)]
    Branch(#[from] BranchStoreError),
    /// Another worker holds the mirror.
    #[error(transparent)]
    Lease(#[from] LeaseError),
    /// The foreign fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl ImportFailure {
    /// Returns the terminal job status for this failure.
    #[must_use]
    pub const fn status(&self) -> JobResultStatus {
        match self {
            Self::Branch(BranchStoreError::NotImportManaged(_)) => JobResultStatus::FailureInvalid,
            Self::Fetch(err) => err.status(),
            Self::Arguments(_) | Self::Branch(_) | Self::Lease(_) => JobResultStatus::Failure,
        }
    }
}

/// Errors that stop the worker before a result can be reported.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// A scheduler call failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerRpcError),
}

/// Runs a single code import job.
pub struct ImportWorker<S, B, R, A>
where
    S: SchedulerClient + 'static,
    B: BranchStore,
    R: CommandRunner,
    A: LogArtifactStore,
{
    scheduler: Arc<S>,
    branches: Arc<B>,
    fetcher: Fetcher<R>,
    artifacts: Arc<A>,
    leases: Arc<LeaseManager>,
    settings: WorkerSettings,
}

impl<S, B, R, A> ImportWorker<S, B, R, A>
where
    S: SchedulerClient + 'static,
    B: BranchStore,
    R: CommandRunner,
    A: LogArtifactStore,
{
    /// Creates a worker for `settings.job_id`.
    #[must_use]
    pub fn new(collaborators: WorkerCollaborators<S, B, R, A>, settings: WorkerSettings) -> Self {
        Self {
            scheduler: collaborators.scheduler,
            branches: collaborators.branches,
            fetcher: Fetcher::new(collaborators.runner),
            artifacts: collaborators.artifacts,
            leases: collaborators.leases,
            settings,
        }
    }

    /// Runs the job and reports its result.
    ///
    /// Import failures are reported as job statuses. A job that turns out
    /// to be gone, whether before the start, during a heartbeat or at
    /// finish, is abandoned without a report.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Scheduler`] when the scheduler cannot be
    /// reached for import data or for the final report.
    pub async fn run(&self) -> Result<WorkerOutcome, WorkerError> {
        let job_id = self.settings.job_id;
        let data = match self.scheduler.get_import_data_for_job_id(job_id).await {
            Ok(data) => data,
            Err(err) if err.is_no_such_job() => {
                tracing::info!(job_id = %job_id, "job no longer exists; nothing to do");
                return Ok(WorkerOutcome::Abandoned);
            }
            Err(err) => return Err(err.into()),
        };
        tracing::info!(
            job_id = %job_id,
            branch_url = %data.branch_url,
            arguments = ?data.arguments,
            "starting code import"
        );

        let (lost_sender, lost_receiver) = oneshot::channel();
        let heartbeat = tokio::spawn(heartbeat_loop(
            Arc::clone(&self.scheduler),
            job_id,
            self.settings.log_file.clone(),
            self.settings.heartbeat_interval,
            lost_sender,
        ));
        let import_result = tokio::select! {
            result = self.import(&data) => Some(result),
            Ok(()) = lost_receiver => None,
        };
        heartbeat.abort();

        let Some(result) = import_result else {
            tracing::warn!(job_id = %job_id, "job was reclaimed; abandoning import");
            discard_scratch(&self.settings.scratch_root, &job_id.to_string());
            return Ok(WorkerOutcome::Abandoned);
        };
        let status = match result {
            Ok(status) => status,
            Err(failure) => {
                tracing::error!(job_id = %job_id, error = %failure, status = %failure.status(), "import failed");
                failure.status()
            }
        };
        let artifact = self.upload_log(&data.log_file_name).await;
        match self.scheduler.finish_job(job_id, status, artifact).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, %status, "finished code import");
                Ok(WorkerOutcome::Finished(status))
            }
            Err(err) if err.is_no_such_job() => {
                tracing::warn!(job_id = %job_id, "job was reclaimed before its result was reported");
                Ok(WorkerOutcome::Abandoned)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn import(&self, data: &ImportData) -> Result<JobResultStatus, ImportFailure> {
        let details = ImportSourceDetails::from_arguments(&data.arguments)?;
        let branch =
            ImportBranchRef::from_branch_url(&self.settings.branch_base_url, &data.branch_url)?;
        if *branch.target() != details.target {
            return Err(BranchStoreError::InvalidBranchPath(format!(
                "branch URL names {branch} but the arguments name {}",
                details.target
            ))
            .into());
        }
        self.leases
            .scoped(details.target.as_str(), || self.update_mirror(&details, &branch))
            .await?
    }

    async fn update_mirror(
        &self,
        details: &ImportSourceDetails,
        branch: &ImportBranchRef,
    ) -> Result<JobResultStatus, ImportFailure> {
        let scratch_name = self.settings.job_id.to_string();
        let mirror = self
            .settings
            .scratch_root
            .join(&scratch_name)
            .join("mirror.git");
        let result = self.fetch_and_publish(details, branch, &mirror).await;
        discard_scratch(&self.settings.scratch_root, &scratch_name);
        result
    }

    async fn fetch_and_publish(
        &self,
        details: &ImportSourceDetails,
        branch: &ImportBranchRef,
        mirror: &Utf8Path,
    ) -> Result<JobResultStatus, ImportFailure> {
        let fresh = self.branches.pull(branch, mirror).await? == PullOutcome::Created;
        let strategy = strategy_for(&details.source);
        match self.fetcher.fetch(strategy.as_ref(), mirror, fresh).await? {
            FetchOutcome::Unchanged => {
                tracing::info!(branch = %branch, "no new history; skipping push");
                Ok(JobResultStatus::SuccessNoChange)
            }
            FetchOutcome::Changed => {
                self.branches.push(branch, mirror).await?;
                Ok(JobResultStatus::Success)
            }
        }
    }

    async fn upload_log(&self, name: &str) -> Option<LogArtifactId> {
        let contents = match read_log(&self.settings.log_file) {
            Ok(contents) => contents,
            Err(err) => {
                tracing::warn!(error = %err, log_file = %self.settings.log_file, "could not read log for upload");
                return None;
            }
        };
        match self.artifacts.upload(name, contents).await {
            Ok(stored) => Some(stored.id),
            Err(err) => {
                tracing::warn!(error = %err, "log upload failed; finishing without it");
                None
            }
        }
    }
}

/// Reports `job_id` as failed when the worker could not be assembled and
/// hands `error` back for the caller to exit with.
pub async fn report_setup_failure<S, E>(scheduler: &S, job_id: JobId, error: E) -> E
where
    S: SchedulerClient + ?Sized,
    E: std::fmt::Display,
{
    tracing::error!(job_id = %job_id, error = %error, "worker setup failed");
    match scheduler
        .finish_job(job_id, JobResultStatus::Failure, None)
        .await
    {
        Ok(()) => tracing::info!(job_id = %job_id, "reported setup failure"),
        Err(err) if err.is_no_such_job() => {
            tracing::warn!(job_id = %job_id, "job was gone before the setup failure was reported");
        }
        Err(err) => tracing::warn!(job_id = %job_id, error = %err, "could not report setup failure"),
    }
    error
}

async fn heartbeat_loop<S: SchedulerClient>(
    scheduler: Arc<S>,
    job_id: JobId,
    log_file: Utf8PathBuf,
    interval: Duration,
    lost: oneshot::Sender<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The claim stamped a heartbeat, so the first report waits one interval.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let tail = read_log_tail(&log_file).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read log tail");
            LogTail::default()
        });
        match scheduler.update_heartbeat(job_id, tail.as_str()).await {
            Ok(()) => tracing::debug!(job_id = %job_id, "heartbeat sent"),
            Err(err) if err.is_no_such_job() => {
                if lost.send(()).is_err() {
                    tracing::debug!(job_id = %job_id, "import already finished");
                }
                return;
            }
            Err(err) => tracing::warn!(job_id = %job_id, error = %err, "heartbeat failed; retrying"),
        }
    }
}

fn discard_scratch(scratch_root: &Utf8Path, name: &str) {
    let removal = open_or_create(scratch_root)
        .map_err(|err| err.to_string())
        .and_then(|root| root.remove_dir_all(name).map_err(|err| err.to_string()));
    if let Err(err) = removal {
        tracing::warn!(scratch = %scratch_root.join(name), error = %err, "could not remove scratch directory");
    }
}
