//! Diesel row models for code import persistence.

use super::schema::{
    code_import_events, code_import_jobs, code_import_machines, code_import_results, code_imports,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for machines.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = code_import_machines)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MachineRow {
    /// Machine identifier.
    pub id: i64,
    /// Hostname.
    pub hostname: String,
    /// Availability state.
    pub state: String,
    /// Last dispatcher poll.
    pub heartbeat: Option<DateTime<Utc>>,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for machines.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = code_import_machines)]
pub struct NewMachineRow {
    /// Hostname.
    pub hostname: String,
    /// Availability state.
    pub state: String,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for import configurations.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = code_imports)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ImportRow {
    /// Import identifier.
    pub id: i64,
    /// Tagged source JSON payload.
    pub source: Value,
    /// Target branch name.
    pub target_branch: String,
    /// Review status.
    pub review_status: String,
    /// Update interval override in seconds.
    pub update_interval_seconds: Option<i64>,
    /// Failed runs since the last success.
    pub consecutive_failure_count: i32,
    /// Date of the last successful run.
    pub date_last_successful: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for import configurations.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = code_imports)]
pub struct NewImportRow {
    /// Tagged source JSON payload.
    pub source: Value,
    /// Target branch name.
    pub target_branch: String,
    /// Review status.
    pub review_status: String,
    /// Update interval override in seconds.
    pub update_interval_seconds: Option<i64>,
    /// Failed runs since the last success.
    pub consecutive_failure_count: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Changeset for import configuration bookkeeping.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = code_imports)]
#[diesel(treat_none_as_null = true)]
pub struct ImportChangeset {
    /// Review status.
    pub review_status: String,
    /// Update interval override in seconds.
    pub update_interval_seconds: Option<i64>,
    /// Failed runs since the last success.
    pub consecutive_failure_count: i32,
    /// Date of the last successful run.
    pub date_last_successful: Option<DateTime<Utc>>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for jobs.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = code_import_jobs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct JobRow {
    /// Job identifier.
    pub id: i64,
    /// Owning import.
    pub import_id: i64,
    /// Lifecycle state.
    pub state: String,
    /// Machine running the job.
    pub machine_id: Option<i64>,
    /// Earliest claim time.
    pub date_due: DateTime<Utc>,
    /// Creation timestamp.
    pub date_created: DateTime<Utc>,
    /// Claim timestamp.
    pub date_started: Option<DateTime<Utc>>,
    /// Last worker heartbeat.
    pub heartbeat: Option<DateTime<Utc>>,
    /// Last reported log excerpt.
    pub log_tail: String,
}

/// Insert model for pending jobs.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = code_import_jobs)]
pub struct NewJobRow {
    /// Owning import.
    pub import_id: i64,
    /// Lifecycle state.
    pub state: String,
    /// Earliest claim time.
    pub date_due: DateTime<Utc>,
    /// Creation timestamp.
    pub date_created: DateTime<Utc>,
    /// Initial log excerpt.
    pub log_tail: String,
}

/// Row model for results.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = code_import_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ResultRow {
    /// Result identifier.
    pub id: uuid::Uuid,
    /// Import the job ran for.
    pub import_id: i64,
    /// Machine that ran the job.
    pub machine_id: Option<i64>,
    /// Terminal status.
    pub status: String,
    /// Last log excerpt.
    pub log_tail: String,
    /// Uploaded log reference.
    pub log_artifact_id: Option<i64>,
    /// Claim timestamp of the job.
    pub date_job_started: Option<DateTime<Utc>>,
    /// Finish timestamp.
    pub date_finished: DateTime<Utc>,
}

/// Query result row for audit events.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = code_import_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    /// Event identifier.
    pub id: uuid::Uuid,
    /// Event kind.
    pub kind: String,
    /// Machine involved.
    pub machine_id: Option<i64>,
    /// Import involved.
    pub import_id: Option<i64>,
    /// Free-text detail.
    pub detail: Option<String>,
    /// Recording timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// Insert model for audit events.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = code_import_events)]
pub struct NewEventRow {
    /// Event identifier.
    pub id: uuid::Uuid,
    /// Event kind.
    pub kind: String,
    /// Machine involved.
    pub machine_id: Option<i64>,
    /// Import involved.
    pub import_id: Option<i64>,
    /// Free-text detail.
    pub detail: Option<String>,
    /// Recording timestamp.
    pub recorded_at: DateTime<Utc>,
}
