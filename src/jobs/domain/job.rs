//! Code import job aggregate and the bounded log excerpt it carries.

use super::{ImportId, JobDomainError, JobId, MachineId, ParseJobStateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a code import job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed once due.
    Pending,
    /// Claimed by a machine.
    Running,
}

impl JobState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobState {
    type Error = ParseJobStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            _ => Err(ParseJobStateError(value.to_owned())),
        }
    }
}

/// Last portion of a worker log, capped at [`LogTail::MAX_CHARS`] characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LogTail(String);

impl LogTail {
    /// Maximum number of characters retained.
    pub const MAX_CHARS: usize = 1000;

    /// Creates a tail, keeping only the trailing [`Self::MAX_CHARS`]
    /// characters of `text`.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let full_text = text.into();
        let total = full_text.chars().count();
        if total <= Self::MAX_CHARS {
            return Self(full_text);
        }
        Self(full_text.chars().skip(total - Self::MAX_CHARS).collect())
    }

    /// Returns the retained text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether no text was retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for LogTail {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for LogTail {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<LogTail> for String {
    fn from(value: LogTail) -> Self {
        value.0
    }
}

impl fmt::Display for LogTail {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Code import job aggregate root.
///
/// Each import has at most one job. A pending job is claimable once
/// `date_due` has passed; a running job belongs to exactly one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeImportJob {
    id: JobId,
    import_id: ImportId,
    state: JobState,
    machine_id: Option<MachineId>,
    date_due: DateTime<Utc>,
    date_created: DateTime<Utc>,
    date_started: Option<DateTime<Utc>>,
    heartbeat: Option<DateTime<Utc>>,
    log_tail: LogTail,
}

/// Parameter object for reconstructing a persisted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedJobData {
    /// Persisted job identifier.
    pub id: JobId,
    /// Import the job belongs to.
    pub import_id: ImportId,
    /// Persisted lifecycle state.
    pub state: JobState,
    /// Machine running the job, if claimed.
    pub machine_id: Option<MachineId>,
    /// Earliest time the job may be claimed.
    pub date_due: DateTime<Utc>,
    /// Persisted creation timestamp.
    pub date_created: DateTime<Utc>,
    /// When the job was claimed.
    pub date_started: Option<DateTime<Utc>>,
    /// Last worker heartbeat.
    pub heartbeat: Option<DateTime<Utc>>,
    /// Last reported log excerpt.
    pub log_tail: LogTail,
}

impl CodeImportJob {
    /// Creates a pending job due at `date_due`.
    #[must_use]
    pub fn pending(
        id: JobId,
        import_id: ImportId,
        date_due: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            import_id,
            state: JobState::Pending,
            machine_id: None,
            date_due,
            date_created: now,
            date_started: None,
            heartbeat: None,
            log_tail: LogTail::default(),
        }
    }

    /// Reconstructs a job from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedJobData) -> Self {
        Self {
            id: data.id,
            import_id: data.import_id,
            state: data.state,
            machine_id: data.machine_id,
            date_due: data.date_due,
            date_created: data.date_created,
            date_started: data.date_started,
            heartbeat: data.heartbeat,
            log_tail: data.log_tail,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the import identifier.
    #[must_use]
    pub const fn import_id(&self) -> ImportId {
        self.import_id
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Returns the machine running the job, if claimed.
    #[must_use]
    pub const fn machine_id(&self) -> Option<MachineId> {
        self.machine_id
    }

    /// Returns the due date.
    #[must_use]
    pub const fn date_due(&self) -> DateTime<Utc> {
        self.date_due
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn date_created(&self) -> DateTime<Utc> {
        self.date_created
    }

    /// Returns when the job was claimed.
    #[must_use]
    pub const fn date_started(&self) -> Option<DateTime<Utc>> {
        self.date_started
    }

    /// Returns the last heartbeat timestamp.
    #[must_use]
    pub const fn heartbeat(&self) -> Option<DateTime<Utc>> {
        self.heartbeat
    }

    /// Returns the last reported log excerpt.
    #[must_use]
    pub const fn log_tail(&self) -> &LogTail {
        &self.log_tail
    }

    /// Returns whether the job is pending and its due date has passed.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.date_due <= now
    }

    /// Assigns the job to `machine_id` and marks it running.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::JobAlreadyRunning`] when the job has been
    /// claimed already.
    pub fn claim(&mut self, machine_id: MachineId, now: DateTime<Utc>) -> Result<(), JobDomainError> {
        if self.state == JobState::Running {
            return Err(JobDomainError::JobAlreadyRunning(self.id));
        }
        self.state = JobState::Running;
        self.machine_id = Some(machine_id);
        self.date_started = Some(now);
        self.heartbeat = Some(now);
        Ok(())
    }

    /// Records a worker heartbeat with the latest log excerpt.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::JobNotRunning`] for pending jobs.
    pub fn record_heartbeat(
        &mut self,
        log_tail: LogTail,
        now: DateTime<Utc>,
    ) -> Result<(), JobDomainError> {
        if self.state != JobState::Running {
            return Err(JobDomainError::JobNotRunning(self.id));
        }
        self.heartbeat = Some(now);
        self.log_tail = log_tail;
        Ok(())
    }

    /// Moves the due date forward to `now` so the job is claimable
    /// immediately.
    ///
    /// Returns `false` when the job is running or already due.
    pub fn request_now(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != JobState::Pending || self.date_due <= now {
            return false;
        }
        self.date_due = now;
        true
    }
}
