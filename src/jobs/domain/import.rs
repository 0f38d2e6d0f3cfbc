//! Import configuration registry data consumed by the scheduler.

use super::{
    ImportId, JobDomainError, JobResultStatus, ParseRegistryValueError, ParseVcsKindError,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Foreign version control system an import mirrors from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VcsKind {
    /// Concurrent Versions System.
    Cvs,
    /// Subversion.
    Svn,
    /// Git.
    Git,
    /// Bazaar.
    Bzr,
}

impl VcsKind {
    /// Returns the canonical storage and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cvs => "cvs",
            Self::Svn => "svn",
            Self::Git => "git",
            Self::Bzr => "bzr",
        }
    }

    /// Returns the update interval used when an import has no override.
    #[must_use]
    pub fn default_update_interval(self) -> TimeDelta {
        match self {
            Self::Cvs => TimeDelta::hours(12),
            Self::Svn | Self::Git | Self::Bzr => TimeDelta::hours(6),
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for VcsKind {
    type Error = ParseVcsKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cvs" => Ok(Self::Cvs),
            "svn" => Ok(Self::Svn),
            "git" => Ok(Self::Git),
            "bzr" => Ok(Self::Bzr),
            _ => Err(ParseVcsKindError(value.to_owned())),
        }
    }
}

/// Location of the foreign repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportSource {
    /// CVS repository root and module.
    Cvs {
        /// CVSROOT string, e.g. `:pserver:anon@cvs.example.org:/cvsroot`.
        root: String,
        /// Module name inside the root.
        module: String,
    },
    /// Subversion repository URL.
    Svn {
        /// Repository URL.
        url: String,
    },
    /// Git repository URL.
    Git {
        /// Repository URL.
        url: String,
    },
    /// Bazaar branch URL.
    Bzr {
        /// Branch URL.
        url: String,
    },
}

impl ImportSource {
    /// Creates a CVS source.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::EmptySourceField`] when either part is empty.
    pub fn cvs(root: impl Into<String>, module: impl Into<String>) -> Result<Self, JobDomainError> {
        Ok(Self::Cvs {
            root: non_empty(root.into(), "CVS root")?,
            module: non_empty(module.into(), "CVS module")?,
        })
    }

    /// Creates a URL-based source for Subversion, Git or Bazaar.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::EmptySourceField`] when the URL is empty and
    /// [`JobDomainError::InvalidWorkerArguments`] when `kind` is CVS, which
    /// needs a root and module instead.
    pub fn from_url(kind: VcsKind, location: impl Into<String>) -> Result<Self, JobDomainError> {
        let url = non_empty(location.into(), "URL")?;
        match kind {
            VcsKind::Svn => Ok(Self::Svn { url }),
            VcsKind::Git => Ok(Self::Git { url }),
            VcsKind::Bzr => Ok(Self::Bzr { url }),
            VcsKind::Cvs => Err(JobDomainError::InvalidWorkerArguments(
                "CVS sources need a root and a module".to_owned(),
            )),
        }
    }

    /// Returns the foreign VCS kind.
    #[must_use]
    pub const fn kind(&self) -> VcsKind {
        match self {
            Self::Cvs { .. } => VcsKind::Cvs,
            Self::Svn { .. } => VcsKind::Svn,
            Self::Git { .. } => VcsKind::Git,
            Self::Bzr { .. } => VcsKind::Bzr,
        }
    }
}

fn non_empty(value: String, field: &'static str) -> Result<String, JobDomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(JobDomainError::EmptySourceField(field));
    }
    Ok(trimmed.to_owned())
}

/// Unique name of the internally hosted branch an import mirrors into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetBranch(String);

impl TargetBranch {
    /// Creates a validated `owner/project/branch` target.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTargetBranch`] unless the value has
    /// exactly three non-empty segments without whitespace or `..`.
    pub fn new(value: impl Into<String>) -> Result<Self, JobDomainError> {
        let raw = value.into();
        let normalized = raw.trim().trim_start_matches('~');
        let segments: Vec<&str> = normalized.split('/').collect();
        let is_valid = segments.len() == 3
            && segments
                .iter()
                .all(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            && !normalized.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(JobDomainError::InvalidTargetBranch(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the unique name as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the unique name flattened into a single path component.
    #[must_use]
    pub fn flattened(&self) -> String {
        self.0.replace('/', "-")
    }
}

impl AsRef<str> for TargetBranch {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TargetBranch {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Review status of an import configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Awaiting review.
    New,
    /// Approved and eligible for scheduling.
    Reviewed,
    /// Paused by an operator.
    Suspended,
    /// Rejected as unusable.
    Invalid,
    /// Stopped after too many consecutive failures.
    Failing,
}

impl ReviewStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewed => "reviewed",
            Self::Suspended => "suspended",
            Self::Invalid => "invalid",
            Self::Failing => "failing",
        }
    }

    /// Returns whether imports in this status are eligible for jobs.
    #[must_use]
    pub const fn is_schedulable(self) -> bool {
        matches!(self, Self::Reviewed)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::New => false,
            Self::Failing => matches!(self, Self::Reviewed),
            Self::Reviewed | Self::Suspended | Self::Invalid => !matches!(
                (self, target),
                (Self::Reviewed, Self::Reviewed)
                    | (Self::Suspended, Self::Suspended)
                    | (Self::Invalid, Self::Invalid)
            ),
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ReviewStatus {
    type Error = ParseRegistryValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "new" => Ok(Self::New),
            "reviewed" => Ok(Self::Reviewed),
            "suspended" => Ok(Self::Suspended),
            "invalid" => Ok(Self::Invalid),
            "failing" => Ok(Self::Failing),
            _ => Err(ParseRegistryValueError {
                kind: "review status",
                value: value.to_owned(),
            }),
        }
    }
}

/// Values needed to register a new import configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImport {
    /// Foreign repository location.
    pub source: ImportSource,
    /// Branch the import mirrors into.
    pub target: TargetBranch,
    /// Optional override of the per-VCS update interval.
    pub update_interval: Option<TimeDelta>,
}

impl NewImport {
    /// Creates a registration request without an interval override.
    #[must_use]
    pub const fn new(source: ImportSource, target: TargetBranch) -> Self {
        Self {
            source,
            target,
            update_interval: None,
        }
    }

    /// Overrides the update interval.
    #[must_use]
    pub const fn with_update_interval(mut self, interval: TimeDelta) -> Self {
        self.update_interval = Some(interval);
        self
    }
}

/// Import configuration aggregate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfiguration {
    id: ImportId,
    source: ImportSource,
    target: TargetBranch,
    review_status: ReviewStatus,
    update_interval: Option<TimeDelta>,
    consecutive_failure_count: u32,
    date_last_successful: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted import configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedImportData {
    /// Persisted import identifier.
    pub id: ImportId,
    /// Persisted source location.
    pub source: ImportSource,
    /// Persisted target branch.
    pub target: TargetBranch,
    /// Persisted review status.
    pub review_status: ReviewStatus,
    /// Persisted update interval override.
    pub update_interval: Option<TimeDelta>,
    /// Persisted consecutive failure count.
    pub consecutive_failure_count: u32,
    /// Persisted date of the last successful run.
    pub date_last_successful: Option<DateTime<Utc>>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ImportConfiguration {
    /// Reconstructs an import configuration from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedImportData) -> Self {
        Self {
            id: data.id,
            source: data.source,
            target: data.target,
            review_status: data.review_status,
            update_interval: data.update_interval,
            consecutive_failure_count: data.consecutive_failure_count,
            date_last_successful: data.date_last_successful,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the import identifier.
    #[must_use]
    pub const fn id(&self) -> ImportId {
        self.id
    }

    /// Returns the foreign repository location.
    #[must_use]
    pub const fn source(&self) -> &ImportSource {
        &self.source
    }

    /// Returns the target branch.
    #[must_use]
    pub const fn target(&self) -> &TargetBranch {
        &self.target
    }

    /// Returns the review status.
    #[must_use]
    pub const fn review_status(&self) -> ReviewStatus {
        self.review_status
    }

    /// Returns the update interval override, if any.
    #[must_use]
    pub const fn update_interval(&self) -> Option<TimeDelta> {
        self.update_interval
    }

    /// Returns the number of failed runs since the last success.
    #[must_use]
    pub const fn consecutive_failure_count(&self) -> u32 {
        self.consecutive_failure_count
    }

    /// Returns the date of the last successful run.
    #[must_use]
    pub const fn date_last_successful(&self) -> Option<DateTime<Utc>> {
        self.date_last_successful
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the interval between scheduled runs.
    #[must_use]
    pub fn effective_update_interval(&self) -> TimeDelta {
        self.update_interval
            .unwrap_or_else(|| self.source.kind().default_update_interval())
    }

    /// Changes the review status. Reviewing an import clears its failure
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidReviewTransition`] when the
    /// transition is not allowed.
    pub fn set_review_status(
        &mut self,
        target_status: ReviewStatus,
        now: DateTime<Utc>,
    ) -> Result<(), JobDomainError> {
        if !self.review_status.can_transition_to(target_status) {
            return Err(JobDomainError::InvalidReviewTransition {
                import_id: self.id,
                from: self.review_status.as_str().to_owned(),
                to: target_status.as_str().to_owned(),
            });
        }
        if target_status == ReviewStatus::Reviewed {
            self.consecutive_failure_count = 0;
        }
        self.review_status = target_status;
        self.updated_at = now;
        Ok(())
    }

    /// Updates failure bookkeeping after a finished job.
    ///
    /// Reaching `consecutive_failure_limit` failures in a row moves a
    /// reviewed import to [`ReviewStatus::Failing`].
    pub fn record_result(
        &mut self,
        status: JobResultStatus,
        consecutive_failure_limit: u32,
        now: DateTime<Utc>,
    ) {
        if status.is_success() {
            self.consecutive_failure_count = 0;
            self.date_last_successful = Some(now);
        } else if status.is_failure() {
            self.consecutive_failure_count = self.consecutive_failure_count.saturating_add(1);
            if self.consecutive_failure_count >= consecutive_failure_limit
                && self.review_status == ReviewStatus::Reviewed
            {
                self.review_status = ReviewStatus::Failing;
            }
        }
        self.updated_at = now;
    }

    /// Returns when the next job should become due after a run finished with
    /// `status`, or `None` when the import is no longer schedulable.
    #[must_use]
    pub fn next_due_after(
        &self,
        status: JobResultStatus,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !self.review_status.is_schedulable() {
            return None;
        }
        if status.continues_immediately() {
            return Some(now);
        }
        Some(now + self.effective_update_interval())
    }
}
