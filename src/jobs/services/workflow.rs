//! Registry-side scheduling: creating, approving and suspending imports,
//! and making sure every reviewed import has a job.

use crate::jobs::{
    domain::{
        CodeImportJob, ImportConfiguration, ImportId, JobDomainError, JobId, JobState, NewImport,
        ReviewStatus,
    },
    ports::{CodeImportStore, CodeImportStoreError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for the job workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The import configuration does not exist.
    #[error("import not found: {0}")]
    ImportNotFound(ImportId),
    /// The import has no job to run.
    #[error("import {0} has no job")]
    NoJobForImport(ImportId),
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] CodeImportStoreError),
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Outcome of a request to run an import's job immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunNowOutcome {
    /// The pending job's due date was moved to now.
    BroughtForward(JobId),
    /// The pending job was already due.
    AlreadyDue(JobId),
    /// The job is running.
    AlreadyRunning(JobId),
}

/// What a scan did with one import that had no job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A job was created.
    Scheduled(JobId),
    /// The import is not reviewed, so no job was created.
    NotSchedulable(ReviewStatus),
    /// Creating the job failed.
    Failed(String),
}

/// Per-import outcomes of [`JobWorkflow::schedule_missing_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Outcomes in import id order.
    pub outcomes: Vec<(ImportId, ScanOutcome)>,
}

impl ScanSummary {
    /// Returns how many jobs were created.
    #[must_use]
    pub fn scheduled(&self) -> usize {
        self.count(|outcome| matches!(outcome, ScanOutcome::Scheduled(_)))
    }

    /// Returns how many imports were skipped as not schedulable.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, ScanOutcome::NotSchedulable(_)))
    }

    /// Returns how many imports failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, ScanOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&ScanOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .count()
    }
}

/// Import registry workflow service.
#[derive(Clone)]
pub struct JobWorkflow<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> JobWorkflow<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    /// Creates a new workflow service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Registers a new import configuration awaiting review.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] when the target branch is already
    /// used by another import or persistence fails.
    pub async fn create_import(&self, import: NewImport) -> WorkflowResult<ImportConfiguration> {
        let configuration = self.store.store_import(import, self.clock.utc()).await?;
        tracing::info!(
            import_id = %configuration.id(),
            target = %configuration.target(),
            kind = %configuration.source().kind(),
            "created import configuration"
        );
        Ok(configuration)
    }

    /// Marks an import as reviewed and makes sure it has a job, due now.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::ImportNotFound`] for unknown imports and
    /// [`WorkflowError::Domain`] when the import is already reviewed.
    pub async fn approve(&self, import_id: ImportId) -> WorkflowResult<CodeImportJob> {
        let now = self.clock.utc();
        let mut import = self.find_import(import_id).await?;
        import.set_review_status(ReviewStatus::Reviewed, now)?;
        self.store.update_import(&import).await?;
        if let Some(existing) = self.store.find_job_for_import(import_id).await? {
            return Ok(existing);
        }
        let job = self.store.insert_job(import_id, now, now).await?;
        tracing::info!(import_id = %import_id, job_id = %job.id(), "approved import");
        Ok(job)
    }

    /// Suspends an import. Its pending job stays but is not claimed until
    /// the import is reviewed again.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::ImportNotFound`] for unknown imports and
    /// [`WorkflowError::Domain`] when the import is already suspended.
    pub async fn suspend(&self, import_id: ImportId) -> WorkflowResult<ImportConfiguration> {
        let mut import = self.find_import(import_id).await?;
        import.set_review_status(ReviewStatus::Suspended, self.clock.utc())?;
        self.store.update_import(&import).await?;
        tracing::info!(import_id = %import_id, "suspended import");
        Ok(import)
    }

    /// Moves an import's pending job to run as soon as possible.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NoJobForImport`] when the import has no job.
    pub async fn request_job_now(&self, import_id: ImportId) -> WorkflowResult<RunNowOutcome> {
        let job = self
            .store
            .find_job_for_import(import_id)
            .await?
            .ok_or(WorkflowError::NoJobForImport(import_id))?;
        if job.state() == JobState::Running {
            return Ok(RunNowOutcome::AlreadyRunning(job.id()));
        }
        let moved = self
            .store
            .bring_job_forward(job.id(), self.clock.utc())
            .await?;
        if moved {
            tracing::info!(import_id = %import_id, job_id = %job.id(), "job requested to run now");
            Ok(RunNowOutcome::BroughtForward(job.id()))
        } else {
            Ok(RunNowOutcome::AlreadyDue(job.id()))
        }
    }

    /// Creates jobs for every reviewed import that has none.
    ///
    /// Reviewed imports with a past success are due one update interval after
    /// it; everything else is due now. A failure on one import is recorded in
    /// the summary and the scan carries on.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Store`] only when listing the imports fails.
    pub async fn schedule_missing_jobs(&self) -> WorkflowResult<ScanSummary> {
        let now = self.clock.utc();
        let imports = self.store.list_imports_without_job().await?;
        let mut summary = ScanSummary::default();
        for import in imports {
            let outcome = if import.review_status().is_schedulable() {
                let date_due = import
                    .date_last_successful()
                    .map_or(now, |last| (last + import.effective_update_interval()).max(now));
                match self.store.insert_job(import.id(), date_due, now).await {
                    Ok(job) => ScanOutcome::Scheduled(job.id()),
                    Err(err) => {
                        tracing::warn!(import_id = %import.id(), error = %err, "failed to schedule import");
                        ScanOutcome::Failed(err.to_string())
                    }
                }
            } else {
                ScanOutcome::NotSchedulable(import.review_status())
            };
            summary.outcomes.push((import.id(), outcome));
        }
        tracing::info!(
            scheduled = summary.scheduled(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "scheduled missing jobs"
        );
        Ok(summary)
    }

    async fn find_import(&self, import_id: ImportId) -> WorkflowResult<ImportConfiguration> {
        self.store
            .find_import(import_id)
            .await?
            .ok_or(WorkflowError::ImportNotFound(import_id))
    }
}
