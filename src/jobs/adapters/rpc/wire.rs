//! JSON request, response and fault bodies of the scheduler RPC surface.

use crate::jobs::{domain::JobResultStatus, ports::SchedulerRpcError};
use serde::{Deserialize, Serialize};

/// Route of `get_job_for_machine`.
pub const GET_JOB_FOR_MACHINE_PATH: &str = "/rpc/get_job_for_machine";
/// Route of `get_import_data_for_job_id`.
pub const GET_IMPORT_DATA_PATH: &str = "/rpc/get_import_data_for_job_id";
/// Route of `update_heartbeat`.
pub const UPDATE_HEARTBEAT_PATH: &str = "/rpc/update_heartbeat";
/// Route of `finish_job`.
pub const FINISH_JOB_PATH: &str = "/rpc/finish_job";

/// Body of `get_job_for_machine`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetJobForMachineRequest {
    /// Hostname of the asking machine.
    pub hostname: String,
    /// Most jobs the machine may run at once.
    pub worker_limit: usize,
}

/// Reply of `get_job_for_machine`; `0` means no job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetJobForMachineResponse {
    /// Claimed job, or `0`.
    pub job_id: i64,
}

/// Body of `get_import_data_for_job_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Job to look up.
    pub job_id: i64,
}

/// Body of `update_heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHeartbeatRequest {
    /// Running job.
    pub job_id: i64,
    /// Tail of the worker log.
    pub log_tail: String,
}

/// Reply of `update_heartbeat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateHeartbeatResponse {
    /// Always `0`.
    pub result: i64,
}

/// Body of `finish_job`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishJobRequest {
    /// Running job.
    pub job_id: i64,
    /// Terminal status.
    pub status: JobResultStatus,
    /// Uploaded log reference, if any.
    pub log_artifact_id: Option<i64>,
}

/// Empty reply of `finish_job`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishJobResponse {}

/// Machine-readable fault code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    /// The job does not exist or is not running.
    NoSuchJob,
    /// The hostname is not registered.
    UnknownMachine,
    /// The request body was malformed.
    InvalidRequest,
    /// The scheduler failed internally.
    Internal,
}

impl FaultCode {
    /// Returns the HTTP status carried with the fault.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::NoSuchJob | Self::UnknownMachine => 404,
            Self::InvalidRequest => 400,
            Self::Internal => 500,
        }
    }
}

/// Fault body returned with a non-success HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcFault {
    /// Fault code.
    pub code: FaultCode,
    /// Human-readable description.
    pub message: String,
}

impl RpcFault {
    /// Creates an `InvalidRequest` fault.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: FaultCode::InvalidRequest,
            message: message.into(),
        }
    }

    /// Converts the fault into a client error. `job_id` is the job named in
    /// the request, if any.
    #[must_use]
    pub fn into_error(self, job_id: Option<i64>) -> SchedulerRpcError {
        match self.code {
            FaultCode::NoSuchJob => SchedulerRpcError::NoSuchJob(job_id.unwrap_or_default()),
            FaultCode::UnknownMachine => SchedulerRpcError::UnknownMachine(self.message),
            FaultCode::InvalidRequest => SchedulerRpcError::InvalidRequest(self.message),
            FaultCode::Internal => SchedulerRpcError::Internal(self.message),
        }
    }
}

impl From<&SchedulerRpcError> for RpcFault {
    fn from(err: &SchedulerRpcError) -> Self {
        let code = match err {
            SchedulerRpcError::NoSuchJob(_) => FaultCode::NoSuchJob,
            SchedulerRpcError::UnknownMachine(_) => FaultCode::UnknownMachine,
            SchedulerRpcError::InvalidRequest(_) => FaultCode::InvalidRequest,
            SchedulerRpcError::Internal(_)
            | SchedulerRpcError::Protocol(_)
            | SchedulerRpcError::Transport(_) => FaultCode::Internal,
        };
        let message = match err {
            SchedulerRpcError::UnknownMachine(hostname) => hostname.clone(),
            other => other.to_string(),
        };
        Self { code, message }
    }
}
