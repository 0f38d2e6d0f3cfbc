//! Worker machine aggregate and its drain-aware state machine.

use super::{CodeImportEventKind, Hostname, JobDomainError, MachineId, ParseMachineStateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability state of a worker machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// Machine accepts new jobs.
    Online,
    /// Machine finishes in-flight jobs but accepts no new ones.
    Quiescing,
    /// Machine is out of rotation.
    Offline,
}

impl MachineState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Quiescing => "quiescing",
            Self::Offline => "offline",
        }
    }

    /// Returns whether machines in this state are offered work.
    #[must_use]
    pub const fn accepts_work(self) -> bool {
        matches!(self, Self::Online)
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// A machine only reaches `Offline` through `Quiescing`, so in-flight
    /// jobs are always drained first.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Online, Self::Quiescing)
                | (Self::Quiescing, Self::Offline | Self::Online)
                | (Self::Offline, Self::Online)
        )
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for MachineState {
    type Error = ParseMachineStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "online" => Ok(Self::Online),
            "quiescing" => Ok(Self::Quiescing),
            "offline" => Ok(Self::Offline),
            _ => Err(ParseMachineStateError(value.to_owned())),
        }
    }
}

/// Operator request moving a machine in or out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineCommand {
    /// Put the machine online.
    Start,
    /// Stop handing out work and let running jobs drain.
    Stop,
}

impl MachineCommand {
    /// Returns the command name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }

    /// Returns the audit event recorded when the command succeeds.
    #[must_use]
    pub const fn event_kind(self) -> CodeImportEventKind {
        match self {
            Self::Start => CodeImportEventKind::MachineOnline,
            Self::Stop => CodeImportEventKind::MachineQuiesce,
        }
    }
}

/// Worker machine aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeImportMachine {
    id: MachineId,
    hostname: Hostname,
    state: MachineState,
    heartbeat: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMachineData {
    /// Persisted machine identifier.
    pub id: MachineId,
    /// Persisted hostname.
    pub hostname: Hostname,
    /// Persisted availability state.
    pub state: MachineState,
    /// Last time the dispatcher on this machine polled for work.
    pub heartbeat: Option<DateTime<Utc>>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl CodeImportMachine {
    /// Reconstructs a machine from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedMachineData) -> Self {
        Self {
            id: data.id,
            hostname: data.hostname,
            state: data.state,
            heartbeat: data.heartbeat,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the machine identifier.
    #[must_use]
    pub const fn id(&self) -> MachineId {
        self.id
    }

    /// Returns the machine hostname.
    #[must_use]
    pub const fn hostname(&self) -> &Hostname {
        &self.hostname
    }

    /// Returns the availability state.
    #[must_use]
    pub const fn state(&self) -> MachineState {
        self.state
    }

    /// Returns the last dispatcher poll timestamp, if any.
    #[must_use]
    pub const fn heartbeat(&self) -> Option<DateTime<Utc>> {
        self.heartbeat
    }

    /// Returns the registration timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Puts the machine back into rotation.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidMachineTransition`] when the machine
    /// is already online.
    pub fn set_online(&mut self, now: DateTime<Utc>) -> Result<(), JobDomainError> {
        self.transition_to(MachineState::Online, now)
    }

    /// Stops accepting new work while in-flight jobs finish.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidMachineTransition`] unless the
    /// machine is online.
    pub fn set_quiescing(&mut self, now: DateTime<Utc>) -> Result<(), JobDomainError> {
        self.transition_to(MachineState::Quiescing, now)
    }

    /// Completes a drain, taking the machine out of rotation.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidMachineTransition`] unless the
    /// machine is quiescing, or [`JobDomainError::MachineNotDrained`] while
    /// `running_jobs` is non-zero.
    pub fn set_offline(
        &mut self,
        running_jobs: usize,
        now: DateTime<Utc>,
    ) -> Result<(), JobDomainError> {
        if self.state.can_transition_to(MachineState::Offline) && running_jobs > 0 {
            return Err(JobDomainError::MachineNotDrained {
                machine_id: self.id,
                running: running_jobs,
            });
        }
        self.transition_to(MachineState::Offline, now)
    }

    /// Applies an administrative command.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidMachineTransition`] when the current
    /// state refuses the command.
    pub fn apply(
        &mut self,
        command: MachineCommand,
        now: DateTime<Utc>,
    ) -> Result<(), JobDomainError> {
        match command {
            MachineCommand::Start => self.set_online(now),
            MachineCommand::Stop => self.set_quiescing(now),
        }
    }

    /// Records a dispatcher poll.
    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        self.heartbeat = Some(now);
    }

    fn transition_to(
        &mut self,
        target_state: MachineState,
        now: DateTime<Utc>,
    ) -> Result<(), JobDomainError> {
        if !self.state.can_transition_to(target_state) {
            return Err(JobDomainError::InvalidMachineTransition {
                from: self.state.as_str().to_owned(),
                to: target_state.as_str().to_owned(),
            });
        }
        self.state = target_state;
        self.updated_at = now;
        Ok(())
    }
}
