//! Operator-facing machine administration.

use crate::jobs::{
    domain::{
        CodeImportJob, CodeImportMachine, Hostname, JobDomainError, MachineCommand, MachineState,
    },
    ports::{CodeImportStore, CodeImportStoreError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for machine administration.
#[derive(Debug, Error)]
pub enum MachineAdminError {
    /// The hostname is not registered.
    #[error("unknown machine: {0}")]
    UnknownMachine(Hostname),
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] CodeImportStoreError),
}

/// Result type for machine administration.
pub type MachineAdminResult<T> = Result<T, MachineAdminError>;

/// A machine together with the jobs it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineStatus {
    /// The machine.
    pub machine: CodeImportMachine,
    /// Jobs currently running on it.
    pub running_jobs: Vec<CodeImportJob>,
}

/// Registers machines and moves them in and out of rotation.
#[derive(Clone)]
pub struct MachineAdminService<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> MachineAdminService<S, C>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
{
    /// Creates a new machine administration service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Registers a new machine. It starts offline.
    ///
    /// # Errors
    ///
    /// Returns [`MachineAdminError::Store`] when the hostname is already
    /// registered or persistence fails.
    pub async fn register(&self, hostname: &Hostname) -> MachineAdminResult<CodeImportMachine> {
        let machine = self
            .store
            .register_machine(hostname, MachineState::Offline, self.clock.utc())
            .await?;
        tracing::info!(hostname = %hostname, machine_id = %machine.id(), "registered machine");
        Ok(machine)
    }

    /// Puts a machine into rotation. Starting a quiescing machine cancels its
    /// drain.
    ///
    /// # Errors
    ///
    /// Returns [`MachineAdminError::UnknownMachine`] for unregistered
    /// hostnames and [`MachineAdminError::Domain`] when the machine is
    /// already online.
    pub async fn start(
        &self,
        hostname: &Hostname,
        reason: Option<String>,
    ) -> MachineAdminResult<CodeImportMachine> {
        self.transition(hostname, reason, MachineCommand::Start)
            .await
    }

    /// Stops handing new work to a machine; it goes offline once its running
    /// jobs finish.
    ///
    /// # Errors
    ///
    /// Returns [`MachineAdminError::UnknownMachine`] for unregistered
    /// hostnames and [`MachineAdminError::Domain`] unless the machine is
    /// online.
    pub async fn stop(
        &self,
        hostname: &Hostname,
        reason: Option<String>,
    ) -> MachineAdminResult<CodeImportMachine> {
        self.transition(hostname, reason, MachineCommand::Stop)
            .await
    }

    /// Returns a machine with its running jobs.
    ///
    /// # Errors
    ///
    /// Returns [`MachineAdminError::UnknownMachine`] for unregistered
    /// hostnames.
    pub async fn status(&self, hostname: &Hostname) -> MachineAdminResult<MachineStatus> {
        let machine = self.find(hostname).await?;
        let running_jobs = self.store.list_running_jobs(machine.id()).await?;
        Ok(MachineStatus {
            machine,
            running_jobs,
        })
    }

    /// Lists every registered machine.
    ///
    /// # Errors
    ///
    /// Returns [`MachineAdminError::Store`] when persistence fails.
    pub async fn list(&self) -> MachineAdminResult<Vec<CodeImportMachine>> {
        Ok(self.store.list_machines().await?)
    }

    async fn find(&self, hostname: &Hostname) -> MachineAdminResult<CodeImportMachine> {
        self.store
            .find_machine_by_hostname(hostname)
            .await?
            .ok_or_else(|| MachineAdminError::UnknownMachine(hostname.clone()))
    }

    async fn transition(
        &self,
        hostname: &Hostname,
        reason: Option<String>,
        command: MachineCommand,
    ) -> MachineAdminResult<CodeImportMachine> {
        let machine_id = self.find(hostname).await?.id();
        let detail = reason.clone().unwrap_or_default();
        let machine = self
            .store
            .transition_machine(machine_id, command, reason, self.clock.utc())
            .await
            .map_err(|err| match err {
                CodeImportStoreError::Transition(domain) => MachineAdminError::Domain(domain),
                CodeImportStoreError::MachineNotFound(_) => {
                    MachineAdminError::UnknownMachine(hostname.clone())
                }
                other => MachineAdminError::Store(other),
            })?;
        tracing::info!(
            hostname = %hostname,
            command = command.as_str(),
            state = %machine.state(),
            reason = %detail,
            "machine state changed"
        );
        Ok(machine)
    }
}
