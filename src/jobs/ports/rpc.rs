//! Client port for the scheduler's remote procedure surface.
//!
//! Dispatchers and workers talk to the scheduler only through this trait,
//! either in process or over HTTP.

use crate::jobs::domain::{Hostname, JobId, JobResultStatus, LogArtifactId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type for scheduler RPC calls.
pub type SchedulerRpcResult<T> = Result<T, SchedulerRpcError>;

/// Data a worker needs to run a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportData {
    /// Positional worker arguments naming the target and the source.
    pub arguments: Vec<String>,
    /// Location of the mirror in the branch store.
    pub branch_url: String,
    /// Name under which the worker log is uploaded.
    pub log_file_name: String,
}

/// Scheduler operations available to dispatchers and workers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    /// Claims the next due job for the machine, or `None` when there is no
    /// work, the machine is not online or it is at `worker_limit`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerRpcError::UnknownMachine`] for unregistered
    /// hostnames.
    async fn get_job_for_machine(
        &self,
        hostname: &Hostname,
        worker_limit: usize,
    ) -> SchedulerRpcResult<Option<JobId>>;

    /// Returns the worker arguments, branch URL and log file name for a job.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerRpcError::NoSuchJob`] when the job does not exist.
    async fn get_import_data_for_job_id(&self, job_id: JobId) -> SchedulerRpcResult<ImportData>;

    /// Records a heartbeat with the tail of the worker log.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerRpcError::NoSuchJob`] when the job is gone or not
    /// running.
    async fn update_heartbeat(&self, job_id: JobId, log_tail: &str) -> SchedulerRpcResult<()>;

    /// Reports the terminal status of a job.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerRpcError::NoSuchJob`] when the job is gone or not
    /// running, including when it was already finished.
    async fn finish_job(
        &self,
        job_id: JobId,
        status: JobResultStatus,
        log_artifact: Option<LogArtifactId>,
    ) -> SchedulerRpcResult<()>;
}

/// Faults and transport failures surfaced by scheduler clients.
#[derive(Debug, Clone, Error)]
pub enum SchedulerRpcError {
    /// The job does not exist or is not running.
    #[error("no such code import job: {0}")]
    NoSuchJob(i64),

    /// The hostname is not registered.
    #[error("unknown machine: {0}")]
    UnknownMachine(String),

    /// The request was rejected as malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The scheduler failed internally.
    #[error("scheduler internal error: {0}")]
    Internal(String),

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The scheduler could not be reached.
    #[error("transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl SchedulerRpcError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Returns whether the fault means the job is gone.
    #[must_use]
    pub const fn is_no_such_job(&self) -> bool {
        matches!(self, Self::NoSuchJob(_))
    }
}
