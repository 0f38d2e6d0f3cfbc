//! Append-only audit events for machine and job lifecycle changes.

use super::{EventId, ImportId, MachineId, ParseRegistryValueError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeImportEventKind {
    /// A machine was put into rotation.
    MachineOnline,
    /// A machine started draining.
    MachineQuiesce,
    /// A machine left rotation.
    MachineOffline,
    /// A job was claimed by a machine.
    JobStart,
    /// A job reported a terminal status.
    JobFinish,
}

impl CodeImportEventKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MachineOnline => "machine_online",
            Self::MachineQuiesce => "machine_quiesce",
            Self::MachineOffline => "machine_offline",
            Self::JobStart => "job_start",
            Self::JobFinish => "job_finish",
        }
    }
}

impl fmt::Display for CodeImportEventKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CodeImportEventKind {
    type Error = ParseRegistryValueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "machine_online" => Ok(Self::MachineOnline),
            "machine_quiesce" => Ok(Self::MachineQuiesce),
            "machine_offline" => Ok(Self::MachineOffline),
            "job_start" => Ok(Self::JobStart),
            "job_finish" => Ok(Self::JobFinish),
            _ => Err(ParseRegistryValueError {
                kind: "event kind",
                value: value.to_owned(),
            }),
        }
    }
}

/// Audit event entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeImportEvent {
    /// Event identifier.
    pub id: EventId,
    /// Event kind.
    pub kind: CodeImportEventKind,
    /// Machine involved, if any.
    pub machine_id: Option<MachineId>,
    /// Import involved, if any.
    pub import_id: Option<ImportId>,
    /// Free-text detail such as an operator's reason.
    pub detail: Option<String>,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl CodeImportEvent {
    /// Creates a machine state event.
    #[must_use]
    pub fn machine(
        kind: CodeImportEventKind,
        machine_id: MachineId,
        detail: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            kind,
            machine_id: Some(machine_id),
            import_id: None,
            detail: detail.filter(|text| !text.trim().is_empty()),
            recorded_at,
        }
    }

    /// Creates a job lifecycle event.
    #[must_use]
    pub fn job(
        kind: CodeImportEventKind,
        import_id: ImportId,
        machine_id: Option<MachineId>,
        detail: Option<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            kind,
            machine_id,
            import_id: Some(import_id),
            detail,
            recorded_at,
        }
    }
}
