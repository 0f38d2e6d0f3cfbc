//! Error types for code import domain validation and parsing.

use super::{ImportId, JobId, MachineId};
use thiserror::Error;

/// Errors returned while constructing or mutating code import domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobDomainError {
    /// A numeric identifier was zero or negative.
    #[error("invalid {kind} identifier {value}, expected a positive integer")]
    InvalidIdentifier {
        /// Identifier kind, such as `job` or `machine`.
        kind: &'static str,
        /// Rejected value.
        value: i64,
    },

    /// The hostname is empty after trimming.
    #[error("machine hostname must not be empty")]
    EmptyHostname,

    /// The hostname contains whitespace.
    #[error("invalid machine hostname '{0}'")]
    InvalidHostname(String),

    /// The target branch does not follow `owner/project/branch` format.
    #[error("invalid target branch '{0}', expected owner/project/branch")]
    InvalidTargetBranch(String),

    /// A source location is empty after trimming.
    #[error("import source {0} must not be empty")]
    EmptySourceField(&'static str),

    /// Worker arguments could not be decoded.
    #[error("invalid worker arguments: {0}")]
    InvalidWorkerArguments(String),

    /// Transitioning between two machine states is not allowed.
    #[error("invalid machine state transition: {from} -> {to}")]
    InvalidMachineTransition {
        /// Current machine state.
        from: String,
        /// Requested machine state.
        to: String,
    },

    /// A quiescing machine still owns running jobs.
    #[error("machine {machine_id} still has {running} running job(s)")]
    MachineNotDrained {
        /// Machine identifier.
        machine_id: MachineId,
        /// Number of running jobs.
        running: usize,
    },

    /// The job has already been claimed by a machine.
    #[error("code import job {0} is already running")]
    JobAlreadyRunning(JobId),

    /// The job is not running, so it cannot accept heartbeats or results.
    #[error("code import job {0} is not running")]
    JobNotRunning(JobId),

    /// Transitioning between two review states is not allowed.
    #[error("invalid review status transition for import {import_id}: {from} -> {to}")]
    InvalidReviewTransition {
        /// Import identifier.
        import_id: ImportId,
        /// Current review status.
        from: String,
        /// Requested review status.
        to: String,
    },
}

/// Error returned while parsing machine states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown machine state: {0}")]
pub struct ParseMachineStateError(pub String);

/// Error returned while parsing job states from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown code import job state: {0}")]
pub struct ParseJobStateError(pub String);

/// Error returned while parsing job result statuses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown code import result status: {0}")]
pub struct ParseResultStatusError(pub String);

/// Error returned while parsing VCS kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported version control system: {0}")]
pub struct ParseVcsKindError(pub String);

/// Error returned while parsing review statuses and event kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseRegistryValueError {
    /// Value kind, such as `review status`.
    pub kind: &'static str,
    /// Rejected value.
    pub value: String,
}
