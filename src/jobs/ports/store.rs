//! Store port holding machines, import configurations, jobs and audit data.
//!
//! Every method that changes more than one record is atomic: adapters run
//! it under a single transaction or lock so competing dispatcher processes
//! observe either all of its effects or none.

use crate::jobs::domain::{
    CodeImportEvent, CodeImportJob, CodeImportMachine, CodeImportResult, Hostname,
    ImportConfiguration, ImportId, JobDomainError, JobId, LogTail, MachineCommand, MachineId,
    MachineState, NewImport, TargetBranch,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for store operations.
pub type CodeImportStoreResult<T> = Result<T, CodeImportStoreError>;

/// Outcome of an atomic attempt to finish draining a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainCheck {
    /// The machine was quiescing with no running jobs and is now offline.
    WentOffline(CodeImportMachine),
    /// The machine is quiescing but still owns running jobs.
    StillRunning(usize),
    /// The machine is not quiescing; nothing changed.
    NotQuiescing(MachineState),
}

/// Outcome of an atomic job claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The oldest due job was assigned to the machine.
    Claimed(CodeImportJob),
    /// The machine already runs `worker_limit` or more jobs.
    AtCapacity {
        /// Jobs currently running on the machine.
        running: usize,
    },
    /// The machine is not online; nothing was claimed.
    MachineUnavailable(MachineState),
    /// No pending job is due.
    NoneDue,
}

/// Everything written when a running job finishes.
///
/// The import's failure bookkeeping is not carried here: adapters apply
/// [`JobCompletion::update_import`] to the import as stored inside the
/// completing transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    /// Job being finished. It must still be running.
    pub job_id: JobId,
    /// Result record to append.
    pub result: CodeImportResult,
    /// Failures in a row after which a reviewed import becomes failing.
    pub consecutive_failure_limit: u32,
    /// Finish event to append.
    pub event: CodeImportEvent,
}

impl JobCompletion {
    /// Records the result on `import` and returns the due date of the
    /// follow-up job, or `None` when the import is no longer schedulable.
    #[must_use]
    pub fn update_import(&self, import: &mut ImportConfiguration) -> Option<DateTime<Utc>> {
        let status = self.result.status;
        let finished_at = self.result.date_finished;
        import.record_result(status, self.consecutive_failure_limit, finished_at);
        import.next_due_after(status, finished_at)
    }
}

/// What finishing a job changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    /// The import after its failure bookkeeping was updated.
    pub import: ImportConfiguration,
    /// Follow-up job, when the import is still schedulable.
    pub next_job: Option<CodeImportJob>,
}

/// Persistence contract for code import coordination.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CodeImportStore: Send + Sync {
    /// Registers a machine in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::DuplicateMachine`] when the hostname is
    /// already registered.
    async fn register_machine(
        &self,
        hostname: &Hostname,
        state: MachineState,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportMachine>;

    /// Finds a machine by hostname.
    async fn find_machine_by_hostname(
        &self,
        hostname: &Hostname,
    ) -> CodeImportStoreResult<Option<CodeImportMachine>>;

    /// Finds a machine by identifier.
    async fn find_machine(
        &self,
        id: MachineId,
    ) -> CodeImportStoreResult<Option<CodeImportMachine>>;

    /// Lists every registered machine ordered by hostname.
    async fn list_machines(&self) -> CodeImportStoreResult<Vec<CodeImportMachine>>;

    /// Applies `command` to a machine under its row lock and records the
    /// matching audit event with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::MachineNotFound`] when the machine
    /// does not exist and [`CodeImportStoreError::Transition`] when its
    /// current state refuses the command. Nothing is written in either case.
    async fn transition_machine(
        &self,
        machine_id: MachineId,
        command: MachineCommand,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportMachine>;

    /// Counts jobs running on a machine.
    async fn count_running_jobs(&self, machine_id: MachineId) -> CodeImportStoreResult<usize>;

    /// Lists jobs running on a machine ordered by start date.
    async fn list_running_jobs(
        &self,
        machine_id: MachineId,
    ) -> CodeImportStoreResult<Vec<CodeImportJob>>;

    /// Moves a quiescing machine with no running jobs offline and records a
    /// `MachineOffline` event, all under one lock.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::MachineNotFound`] when the machine
    /// does not exist.
    async fn offline_if_drained(
        &self,
        machine_id: MachineId,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<DrainCheck>;

    /// Stores a new import configuration with review status `New`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::DuplicateImportTarget`] when another
    /// import already mirrors into the same target branch.
    async fn store_import(
        &self,
        import: NewImport,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<ImportConfiguration>;

    /// Finds an import configuration by identifier.
    async fn find_import(
        &self,
        id: ImportId,
    ) -> CodeImportStoreResult<Option<ImportConfiguration>>;

    /// Persists changes to an import configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::ImportNotFound`] when the import does
    /// not exist.
    async fn update_import(&self, import: &ImportConfiguration) -> CodeImportStoreResult<()>;

    /// Lists import configurations that currently have no job, ordered by id.
    async fn list_imports_without_job(&self) -> CodeImportStoreResult<Vec<ImportConfiguration>>;

    /// Inserts a pending job for an import.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::DuplicateJobForImport`] when the import
    /// already has a job and [`CodeImportStoreError::ImportNotFound`] when the
    /// import does not exist.
    async fn insert_job(
        &self,
        import_id: ImportId,
        date_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<CodeImportJob>;

    /// Finds a job by identifier.
    async fn find_job(&self, id: JobId) -> CodeImportStoreResult<Option<CodeImportJob>>;

    /// Finds the job of an import, if any.
    async fn find_job_for_import(
        &self,
        import_id: ImportId,
    ) -> CodeImportStoreResult<Option<CodeImportJob>>;

    /// Moves a pending job's due date earlier, to `date_due`.
    ///
    /// Returns `false` without changes when the job is running or is already
    /// due by `date_due`.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::JobNotFound`] when the job does not
    /// exist.
    async fn bring_job_forward(
        &self,
        job_id: JobId,
        date_due: DateTime<Utc>,
    ) -> CodeImportStoreResult<bool>;

    /// Atomically checks machine state and capacity, then assigns the oldest
    /// due pending job of a reviewed import to the machine and records a
    /// `JobStart` event.
    ///
    /// Ties on the due date are broken by job id. Two concurrent calls never
    /// claim the same job.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::MachineNotFound`] when the machine
    /// does not exist.
    async fn claim_next_job(
        &self,
        machine_id: MachineId,
        worker_limit: usize,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<ClaimOutcome>;

    /// Records a heartbeat and log tail for a running job.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::JobNotFound`] when the job does not
    /// exist and [`CodeImportStoreError::JobNotRunning`] when it is pending.
    async fn record_heartbeat(
        &self,
        job_id: JobId,
        log_tail: &LogTail,
        now: DateTime<Utc>,
    ) -> CodeImportStoreResult<()>;

    /// Deletes a running job, appends its result and finish event, updates
    /// the import and inserts the follow-up job, all in one transaction.
    ///
    /// The import is read and locked inside that transaction before
    /// [`JobCompletion::update_import`] is applied to it.
    ///
    /// # Errors
    ///
    /// Returns [`CodeImportStoreError::JobNotFound`] when the job is gone and
    /// [`CodeImportStoreError::JobNotRunning`] when it is pending. Nothing is
    /// written in either case.
    async fn complete_job(
        &self,
        completion: JobCompletion,
    ) -> CodeImportStoreResult<CompletedJob>;

    /// Appends an audit event.
    async fn record_event(&self, event: &CodeImportEvent) -> CodeImportStoreResult<()>;

    /// Lists audit events in recording order.
    async fn list_events(&self) -> CodeImportStoreResult<Vec<CodeImportEvent>>;

    /// Lists results for an import, newest first.
    async fn list_results(
        &self,
        import_id: ImportId,
    ) -> CodeImportStoreResult<Vec<CodeImportResult>>;
}

/// Errors returned by store implementations.
#[derive(Debug, Clone, Error)]
pub enum CodeImportStoreError {
    /// A machine with the same hostname is already registered.
    #[error("duplicate machine hostname: {0}")]
    DuplicateMachine(Hostname),

    /// Another import already mirrors into the target branch.
    #[error("duplicate import target branch: {0}")]
    DuplicateImportTarget(TargetBranch),

    /// The import already has a job.
    #[error("import {0} already has a job")]
    DuplicateJobForImport(ImportId),

    /// The machine was not found.
    #[error("machine not found: {0}")]
    MachineNotFound(MachineId),

    /// The machine's current state refuses the requested change.
    #[error(transparent)]
    Transition(JobDomainError),

    /// The import configuration was not found.
    #[error("import not found: {0}")]
    ImportNotFound(ImportId),

    /// The job was not found.
    #[error("code import job not found: {0}")]
    JobNotFound(JobId),

    /// The job exists but is not running.
    #[error("code import job {0} is not running")]
    JobNotRunning(JobId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl CodeImportStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
