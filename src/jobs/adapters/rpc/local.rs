//! In-process scheduler client calling the service directly.

use crate::jobs::{
    domain::{Hostname, JobId, JobResultStatus, LogArtifactId},
    ports::{CodeImportStore, ImportData, SchedulerClient, SchedulerRpcError, SchedulerRpcResult},
    services::SchedulerService,
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;

/// Scheduler client for dispatchers and workers sharing the scheduler's
/// process.
#[derive(Clone)]
pub struct LocalSchedulerClient<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    service: Arc<SchedulerService<S, C>>,
}

impl<S, C> LocalSchedulerClient<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    /// Wraps a scheduler service.
    #[must_use]
    pub const fn new(service: Arc<SchedulerService<S, C>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S, C> SchedulerClient for LocalSchedulerClient<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    async fn get_job_for_machine(
        &self,
        hostname: &Hostname,
        worker_limit: usize,
    ) -> SchedulerRpcResult<Option<JobId>> {
        self.service
            .get_job_for_machine(hostname, worker_limit)
            .await
            .map_err(SchedulerRpcError::from)
    }

    async fn get_import_data_for_job_id(&self, job_id: JobId) -> SchedulerRpcResult<ImportData> {
        self.service
            .get_import_data_for_job_id(job_id)
            .await
            .map_err(SchedulerRpcError::from)
    }

    async fn update_heartbeat(&self, job_id: JobId, log_tail: &str) -> SchedulerRpcResult<()> {
        self.service
            .update_heartbeat(job_id, log_tail)
            .await
            .map_err(SchedulerRpcError::from)
    }

    async fn finish_job(
        &self,
        job_id: JobId,
        status: JobResultStatus,
        log_artifact: Option<LogArtifactId>,
    ) -> SchedulerRpcResult<()> {
        self.service
            .finish_job(job_id, status, log_artifact)
            .await
            .map_err(SchedulerRpcError::from)
    }
}
