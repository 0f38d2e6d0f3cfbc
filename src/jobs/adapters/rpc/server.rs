//! Axum routes exposing the scheduler service over JSON/HTTP.

use super::wire::{
    FINISH_JOB_PATH, FinishJobRequest, FinishJobResponse, GET_IMPORT_DATA_PATH,
    GET_JOB_FOR_MACHINE_PATH, GetJobForMachineRequest, GetJobForMachineResponse, JobRequest,
    RpcFault, UPDATE_HEARTBEAT_PATH, UpdateHeartbeatRequest, UpdateHeartbeatResponse,
};
use crate::jobs::{
    domain::{Hostname, JobId, LogArtifactId},
    ports::{CodeImportStore, ImportData, SchedulerRpcError},
    services::SchedulerService,
};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use mockable::Clock;
use std::sync::Arc;

type SharedScheduler<S, C> = Arc<SchedulerService<S, C>>;
type RpcReply<T> = Result<Json<T>, RpcFault>;

/// Builds the router serving the four scheduler procedures under `/rpc/`.
pub fn scheduler_router<S, C>(service: SharedScheduler<S, C>) -> Router
where
    S: CodeImportStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    Router::new()
        .route(GET_JOB_FOR_MACHINE_PATH, post(get_job_for_machine::<S, C>))
        .route(GET_IMPORT_DATA_PATH, post(get_import_data_for_job_id::<S, C>))
        .route(UPDATE_HEARTBEAT_PATH, post(update_heartbeat::<S, C>))
        .route(FINISH_JOB_PATH, post(finish_job::<S, C>))
        .with_state(service)
}

impl IntoResponse for RpcFault {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn fault(err: &SchedulerRpcError) -> RpcFault {
    let rpc_fault = RpcFault::from(err);
    if matches!(err, SchedulerRpcError::Internal(_)) {
        tracing::error!(error = %err, "scheduler request failed");
    }
    rpc_fault
}

fn job_id_from_wire(value: i64) -> Result<JobId, RpcFault> {
    JobId::new(value).map_err(|_| fault(&SchedulerRpcError::NoSuchJob(value)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, RpcFault> {
    payload
        .map(|Json(request)| request)
        .map_err(|rejection| RpcFault::invalid_request(rejection.body_text()))
}

async fn get_job_for_machine<S, C>(
    State(service): State<SharedScheduler<S, C>>,
    payload: Result<Json<GetJobForMachineRequest>, JsonRejection>,
) -> RpcReply<GetJobForMachineResponse>
where
    S: CodeImportStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    let request = body(payload)?;
    let hostname = Hostname::new(request.hostname)
        .map_err(|err| RpcFault::invalid_request(err.to_string()))?;
    let job_id = service
        .get_job_for_machine(&hostname, request.worker_limit)
        .await
        .map_err(|err| fault(&SchedulerRpcError::from(err)))?;
    Ok(Json(GetJobForMachineResponse {
        job_id: JobId::to_wire(job_id),
    }))
}

async fn get_import_data_for_job_id<S, C>(
    State(service): State<SharedScheduler<S, C>>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> RpcReply<ImportData>
where
    S: CodeImportStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    let request = body(payload)?;
    let job_id = job_id_from_wire(request.job_id)?;
    let data = service
        .get_import_data_for_job_id(job_id)
        .await
        .map_err(|err| fault(&SchedulerRpcError::from(err)))?;
    Ok(Json(data))
}

async fn update_heartbeat<S, C>(
    State(service): State<SharedScheduler<S, C>>,
    payload: Result<Json<UpdateHeartbeatRequest>, JsonRejection>,
) -> RpcReply<UpdateHeartbeatResponse>
where
    S: CodeImportStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    let request = body(payload)?;
    let job_id = job_id_from_wire(request.job_id)?;
    service
        .update_heartbeat(job_id, &request.log_tail)
        .await
        .map_err(|err| fault(&SchedulerRpcError::from(err)))?;
    Ok(Json(UpdateHeartbeatResponse { result: 0 }))
}

async fn finish_job<S, C>(
    State(service): State<SharedScheduler<S, C>>,
    payload: Result<Json<FinishJobRequest>, JsonRejection>,
) -> RpcReply<FinishJobResponse>
where
    S: CodeImportStore + 'static,
    C: Clock + Send + Sync + 'static,
{
    let request = body(payload)?;
    let job_id = job_id_from_wire(request.job_id)?;
    let log_artifact = request
        .log_artifact_id
        .map(LogArtifactId::new)
        .transpose()
        .map_err(|err| RpcFault::invalid_request(err.to_string()))?;
    service
        .finish_job(job_id, request.status, log_artifact)
        .await
        .map_err(|err| fault(&SchedulerRpcError::from(err)))?;
    Ok(Json(FinishJobResponse {}))
}
