//! HTTP scheduler client used by dispatchers and workers on worker hosts.

use super::wire::{
    FINISH_JOB_PATH, FinishJobRequest, FinishJobResponse, GET_IMPORT_DATA_PATH,
    GET_JOB_FOR_MACHINE_PATH, GetJobForMachineRequest, GetJobForMachineResponse, JobRequest,
    RpcFault, UPDATE_HEARTBEAT_PATH, UpdateHeartbeatRequest, UpdateHeartbeatResponse,
};
use crate::jobs::{
    domain::{Hostname, JobId, JobResultStatus, LogArtifactId},
    ports::{ImportData, SchedulerClient, SchedulerRpcError, SchedulerRpcResult},
};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Scheduler client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSchedulerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSchedulerClient {
    /// Creates a client for the scheduler at `base_url` with a per-request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerRpcError::Transport`] when the HTTP client cannot
    /// be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SchedulerRpcResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SchedulerRpcError::transport)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn call<Req, Resp>(
        &self,
        path: &str,
        request: &Req,
        job_id: Option<i64>,
    ) -> SchedulerRpcResult<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(SchedulerRpcError::transport)?;
        let status = response.status();
        if status.is_success() {
            return response.json::<Resp>().await.map_err(|err| {
                SchedulerRpcError::Protocol(format!("malformed reply from {url}: {err}"))
            });
        }
        let rpc_fault = response.json::<RpcFault>().await.map_err(|err| {
            SchedulerRpcError::Protocol(format!("HTTP {status} from {url} without fault body: {err}"))
        })?;
        Err(rpc_fault.into_error(job_id))
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    async fn get_job_for_machine(
        &self,
        hostname: &Hostname,
        worker_limit: usize,
    ) -> SchedulerRpcResult<Option<JobId>> {
        let request = GetJobForMachineRequest {
            hostname: hostname.as_str().to_owned(),
            worker_limit,
        };
        let reply: GetJobForMachineResponse =
            self.call(GET_JOB_FOR_MACHINE_PATH, &request, None).await?;
        JobId::from_wire(reply.job_id)
            .map_err(|err| SchedulerRpcError::Protocol(err.to_string()))
    }

    async fn get_import_data_for_job_id(&self, job_id: JobId) -> SchedulerRpcResult<ImportData> {
        let request = JobRequest {
            job_id: job_id.value(),
        };
        self.call(GET_IMPORT_DATA_PATH, &request, Some(job_id.value()))
            .await
    }

    async fn update_heartbeat(&self, job_id: JobId, log_tail: &str) -> SchedulerRpcResult<()> {
        let request = UpdateHeartbeatRequest {
            job_id: job_id.value(),
            log_tail: log_tail.to_owned(),
        };
        let _: UpdateHeartbeatResponse = self
            .call(UPDATE_HEARTBEAT_PATH, &request, Some(job_id.value()))
            .await?;
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: JobId,
        status: JobResultStatus,
        log_artifact: Option<LogArtifactId>,
    ) -> SchedulerRpcResult<()> {
        let request = FinishJobRequest {
            job_id: job_id.value(),
            status,
            log_artifact_id: log_artifact.map(LogArtifactId::value),
        };
        let _: FinishJobResponse = self
            .call(FINISH_JOB_PATH, &request, Some(job_id.value()))
            .await?;
        Ok(())
    }
}
