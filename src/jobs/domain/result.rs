//! Terminal job statuses and the per-run result record.

use super::{ImportId, LogArtifactId, LogTail, MachineId, ParseResultStatusError, ResultId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal status reported for a finished code import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobResultStatus {
    /// The mirror was updated.
    Success,
    /// The foreign repository had no new history.
    SuccessNoChange,
    /// Some history was imported and more remains.
    SuccessPartial,
    /// The import failed for an unclassified reason.
    Failure,
    /// The foreign repository is not a valid source.
    FailureInvalid,
    /// The foreign repository uses a feature the importer cannot handle.
    FailureUnsupportedFeature,
    /// Access to the foreign repository was refused.
    FailureForbidden,
    /// The foreign repository is unreachable or corrupt.
    FailureRemoteBroken,
    /// The job was reclaimed after its heartbeat went stale.
    Reclaimed,
    /// The job was killed by an operator.
    Killed,
}

impl JobResultStatus {
    /// All statuses in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Success,
        Self::SuccessNoChange,
        Self::SuccessPartial,
        Self::Failure,
        Self::FailureInvalid,
        Self::FailureUnsupportedFeature,
        Self::FailureForbidden,
        Self::FailureRemoteBroken,
        Self::Reclaimed,
        Self::Killed,
    ];

    /// Returns the canonical storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessNoChange => "success_nochange",
            Self::SuccessPartial => "success_partial",
            Self::Failure => "failure",
            Self::FailureInvalid => "failure_invalid",
            Self::FailureUnsupportedFeature => "failure_unsupported_feature",
            Self::FailureForbidden => "failure_forbidden",
            Self::FailureRemoteBroken => "failure_remote_broken",
            Self::Reclaimed => "reclaimed",
            Self::Killed => "killed",
        }
    }

    /// Returns whether the run counts as successful.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(
            self,
            Self::Success | Self::SuccessNoChange | Self::SuccessPartial
        )
    }

    /// Returns whether the run counts towards the consecutive failure limit.
    ///
    /// Reclaimed and killed jobs say nothing about the foreign repository
    /// and are neutral.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failure
                | Self::FailureInvalid
                | Self::FailureUnsupportedFeature
                | Self::FailureForbidden
                | Self::FailureRemoteBroken
        )
    }

    /// Returns whether the next run should start without waiting for the
    /// update interval.
    #[must_use]
    pub const fn continues_immediately(self) -> bool {
        matches!(self, Self::SuccessPartial)
    }

    /// Returns the worker process exit code reporting this status.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure | Self::Reclaimed | Self::Killed => 1,
            Self::SuccessNoChange => 2,
            Self::SuccessPartial => 3,
            Self::FailureInvalid => 4,
            Self::FailureUnsupportedFeature => 5,
            Self::FailureForbidden => 6,
            Self::FailureRemoteBroken => 7,
        }
    }
}

impl fmt::Display for JobResultStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobResultStatus {
    type Error = ParseResultStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseResultStatusError(value.to_owned()))
    }
}

/// Record of one finished code import job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeImportResult {
    /// Result identifier.
    pub id: ResultId,
    /// Import the job ran for.
    pub import_id: ImportId,
    /// Machine that ran the job.
    pub machine_id: Option<MachineId>,
    /// Terminal status.
    pub status: JobResultStatus,
    /// Last log excerpt reported by the worker.
    pub log_tail: LogTail,
    /// Uploaded worker log, if any.
    pub log_artifact: Option<LogArtifactId>,
    /// When the job was claimed.
    pub date_job_started: Option<DateTime<Utc>>,
    /// When the job was finished.
    pub date_finished: DateTime<Utc>,
}
