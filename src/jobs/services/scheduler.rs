//! Scheduler service: the single authority for job assignment, heartbeats
//! and completion.

use crate::jobs::{
    domain::{
        CodeImportEvent, CodeImportEventKind, CodeImportResult, Hostname, ImportSourceDetails,
        JobDomainError, JobId, JobResultStatus, JobState, LogArtifactId, LogTail, MachineState,
        ResultId, TargetBranch,
    },
    ports::{
        ClaimOutcome, CodeImportStore, CodeImportStoreError, DrainCheck, ImportData,
        JobCompletion, SchedulerRpcError,
    },
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Number of consecutive failures after which an import stops being
/// scheduled.
pub const DEFAULT_CONSECUTIVE_FAILURE_LIMIT: u32 = 5;

/// Tunables applied by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerPolicy {
    branch_base_url: String,
    consecutive_failure_limit: u32,
}

impl SchedulerPolicy {
    /// Creates a policy publishing branches under `branch_base_url`.
    #[must_use]
    pub fn new(branch_base_url: impl Into<String>) -> Self {
        Self {
            branch_base_url: branch_base_url.into().trim_end_matches('/').to_owned(),
            consecutive_failure_limit: DEFAULT_CONSECUTIVE_FAILURE_LIMIT,
        }
    }

    /// Overrides the consecutive failure limit.
    #[must_use]
    pub const fn with_consecutive_failure_limit(mut self, limit: u32) -> Self {
        self.consecutive_failure_limit = limit;
        self
    }

    /// Returns the branch store base URL.
    #[must_use]
    pub fn branch_base_url(&self) -> &str {
        &self.branch_base_url
    }

    /// Returns the consecutive failure limit.
    #[must_use]
    pub const fn consecutive_failure_limit(&self) -> u32 {
        self.consecutive_failure_limit
    }

    /// Returns the branch store URL of a target branch.
    #[must_use]
    pub fn branch_url(&self, target: &TargetBranch) -> String {
        format!("{}/{}", self.branch_base_url, target)
    }
}

/// Service-level errors for scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The hostname is not registered.
    #[error("unknown machine: {0}")]
    UnknownMachine(Hostname),
    /// The job does not exist or is not running.
    #[error("no such code import job: {0}")]
    NoSuchJob(JobId),
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] CodeImportStoreError),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<SchedulerError> for SchedulerRpcError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::UnknownMachine(hostname) => Self::UnknownMachine(hostname.to_string()),
            SchedulerError::NoSuchJob(job_id) => Self::NoSuchJob(job_id.value()),
            SchedulerError::Domain(domain) => Self::InvalidRequest(domain.to_string()),
            SchedulerError::Store(store) => Self::Internal(store.to_string()),
        }
    }
}

/// Scheduler orchestration service.
///
/// Stateless apart from its collaborators; any number of instances may
/// serve the same store.
#[derive(Clone)]
pub struct SchedulerService<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    policy: SchedulerPolicy,
}

impl<S, C> SchedulerService<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    /// Creates a new scheduler service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>, policy: SchedulerPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Returns the scheduler policy.
    #[must_use]
    pub const fn policy(&self) -> &SchedulerPolicy {
        &self.policy
    }

    /// Hands the oldest due job to the machine, or `None` when there is
    /// nothing to do.
    ///
    /// A quiescing machine with no running jobs is moved offline here. A
    /// machine already running `worker_limit` jobs gets `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownMachine`] for unregistered hostnames
    /// and [`SchedulerError::Store`] when persistence fails.
    pub async fn get_job_for_machine(
        &self,
        hostname: &Hostname,
        worker_limit: usize,
    ) -> SchedulerResult<Option<JobId>> {
        let machine = self
            .store
            .find_machine_by_hostname(hostname)
            .await?
            .ok_or_else(|| SchedulerError::UnknownMachine(hostname.clone()))?;
        let now = self.clock.utc();

        match machine.state() {
            MachineState::Offline => {
                tracing::info!(hostname = %hostname, "machine is offline; no job offered");
                Ok(None)
            }
            MachineState::Quiescing => {
                match self.store.offline_if_drained(machine.id(), now).await? {
                    DrainCheck::WentOffline(_) => {
                        tracing::info!(hostname = %hostname, "quiescing machine drained; now offline");
                    }
                    DrainCheck::StillRunning(running) => {
                        tracing::info!(hostname = %hostname, running, "machine is quiescing");
                    }
                    DrainCheck::NotQuiescing(state) => {
                        tracing::debug!(hostname = %hostname, %state, "machine state changed during drain check");
                    }
                }
                Ok(None)
            }
            MachineState::Online => {
                let outcome = self
                    .store
                    .claim_next_job(machine.id(), worker_limit, now)
                    .await?;
                Ok(log_claim(hostname, worker_limit, outcome))
            }
        }
    }

    /// Returns the worker arguments, branch URL and log file name for a job.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSuchJob`] when the job does not exist.
    pub async fn get_import_data_for_job_id(&self, job_id: JobId) -> SchedulerResult<ImportData> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .ok_or(SchedulerError::NoSuchJob(job_id))?;
        let import = self
            .store
            .find_import(job.import_id())
            .await?
            .ok_or(CodeImportStoreError::ImportNotFound(job.import_id()))?;
        let target = import.target();
        let details = ImportSourceDetails::new(target.clone(), import.source().clone());
        Ok(ImportData {
            arguments: details.to_arguments(),
            branch_url: self.policy.branch_url(target),
            log_file_name: format!("{}-{}.log", target.flattened(), job_id),
        })
    }

    /// Records a worker heartbeat, keeping the tail of `log_tail`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSuchJob`] when the job is gone or not
    /// running.
    pub async fn update_heartbeat(&self, job_id: JobId, log_tail: &str) -> SchedulerResult<()> {
        let tail = LogTail::new(log_tail);
        self.store
            .record_heartbeat(job_id, &tail, self.clock.utc())
            .await
            .map_err(|err| no_such_job_or(job_id, err))
    }

    /// Finishes a running job: records its result, updates the import's
    /// failure bookkeeping and schedules the next run.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::NoSuchJob`] when the job is gone or not
    /// running, including a second call for the same job.
    pub async fn finish_job(
        &self,
        job_id: JobId,
        status: JobResultStatus,
        log_artifact: Option<LogArtifactId>,
    ) -> SchedulerResult<()> {
        let job = self
            .store
            .find_job(job_id)
            .await?
            .filter(|job| job.state() == JobState::Running)
            .ok_or(SchedulerError::NoSuchJob(job_id))?;
        let now = self.clock.utc();
        let result = CodeImportResult {
            id: ResultId::new(),
            import_id: job.import_id(),
            machine_id: job.machine_id(),
            status,
            log_tail: job.log_tail().clone(),
            log_artifact,
            date_job_started: job.date_started(),
            date_finished: now,
        };
        let event = CodeImportEvent::job(
            CodeImportEventKind::JobFinish,
            job.import_id(),
            job.machine_id(),
            Some(status.as_str().to_owned()),
            now,
        );
        let completed = self
            .store
            .complete_job(JobCompletion {
                job_id,
                result,
                consecutive_failure_limit: self.policy.consecutive_failure_limit,
                event,
            })
            .await
            .map_err(|err| no_such_job_or(job_id, err))?;

        tracing::info!(
            job_id = %job_id,
            import_id = %job.import_id(),
            %status,
            review_status = %completed.import.review_status(),
            next_job_id = ?completed.next_job.as_ref().map(|next| next.id().value()),
            "finished code import job"
        );
        Ok(())
    }
}

fn log_claim(
    hostname: &Hostname,
    worker_limit: usize,
    outcome: ClaimOutcome,
) -> Option<JobId> {
    match outcome {
        ClaimOutcome::Claimed(job) => {
            tracing::info!(
                hostname = %hostname,
                job_id = %job.id(),
                import_id = %job.import_id(),
                "assigned code import job"
            );
            Some(job.id())
        }
        ClaimOutcome::AtCapacity { running } => {
            tracing::info!(hostname = %hostname, running, worker_limit, "machine at capacity");
            None
        }
        ClaimOutcome::MachineUnavailable(state) => {
            tracing::info!(hostname = %hostname, %state, "machine stopped accepting work");
            None
        }
        ClaimOutcome::NoneDue => {
            tracing::debug!(hostname = %hostname, "no code import job due");
            None
        }
    }
}

fn no_such_job_or(job_id: JobId, err: CodeImportStoreError) -> SchedulerError {
    match err {
        CodeImportStoreError::JobNotFound(_) | CodeImportStoreError::JobNotRunning(_) => {
            SchedulerError::NoSuchJob(job_id)
        }
        other => SchedulerError::Store(other),
    }
}
