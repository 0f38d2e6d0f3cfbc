//! One dispatch cycle for the local machine.

use super::launcher::WorkerLauncher;
use crate::jobs::{
    domain::{Hostname, JobId, MachineId, MachineState},
    ports::{CodeImportStore, CodeImportStoreError, DrainCheck, SchedulerClient, SchedulerRpcError},
};
use mockable::Clock;
use std::{io, sync::Arc};
use thiserror::Error;

/// Settings for the local machine's dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Hostname the machine is registered under.
    pub hostname: Hostname,
    /// Limit sent to the scheduler with each claim.
    pub worker_limit: usize,
    /// Local ceiling on running jobs, checked before asking for work.
    pub max_local_jobs: usize,
}

/// What a dispatch cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The machine is offline; nothing was asked.
    Offline,
    /// The machine was quiescing with no running jobs and is now offline.
    WentOffline,
    /// The machine is quiescing and still running jobs.
    Draining {
        /// Jobs still running.
        running: usize,
    },
    /// The local ceiling is reached.
    AtCapacity {
        /// Jobs running on the machine.
        running: usize,
        /// Configured ceiling.
        ceiling: usize,
    },
    /// The scheduler had no job for the machine.
    NoWork,
    /// A worker was started for the claimed job.
    Launched(JobId),
}

/// Errors that abort a dispatch cycle.
#[derive(Debug, Clone, Error)]
pub enum DispatcherError {
    /// The local machine is not registered.
    #[error("machine {0} is not registered with the scheduler")]
    UnknownMachine(Hostname),
    /// A store read or drain transition failed.
    #[error(transparent)]
    Store(#[from] CodeImportStoreError),
    /// The claim call failed.
    #[error(transparent)]
    Scheduler(#[from] SchedulerRpcError),
    /// The worker process could not be started.
    #[error("failed to launch worker for job {job_id}: {source}")]
    Launch {
        /// Claimed job left without a worker.
        job_id: JobId,
        /// Underlying error.
        source: Arc<io::Error>,
    },
}

/// Result type for dispatch cycles.
pub type DispatcherResult<T> = Result<T, DispatcherError>;

/// Claims work for the local machine and starts workers for it.
pub struct Dispatcher<S, C, Q, L>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
    Q: SchedulerClient,
    L: WorkerLauncher,
{
    store: Arc<S>,
    clock: Arc<C>,
    scheduler: Arc<Q>,
    launcher: L,
    settings: DispatcherSettings,
}

impl<S, C, Q, L> Dispatcher<S, C, Q, L>
where
    S: CodeImportStore,
    C: Clock + Send + Sync,
    Q: SchedulerClient,
    L: WorkerLauncher,
{
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        clock: Arc<C>,
        scheduler: Arc<Q>,
        launcher: L,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            store,
            clock,
            scheduler,
            launcher,
            settings,
        }
    }

    /// Runs one cycle.
    ///
    /// An offline machine makes no calls. A quiescing machine is moved
    /// offline once drained and never asks for work. An online machine
    /// asks for at most one job and starts a worker for it without
    /// waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::UnknownMachine`] for an unregistered
    /// hostname and propagates store, scheduler and launch failures.
    pub async fn run_cycle(&self) -> DispatcherResult<DispatchOutcome> {
        let hostname = &self.settings.hostname;
        let machine = self
            .store
            .find_machine_by_hostname(hostname)
            .await?
            .ok_or_else(|| DispatcherError::UnknownMachine(hostname.clone()))?;

        match machine.state() {
            MachineState::Offline => {
                tracing::info!(hostname = %hostname, "machine is offline; not dispatching");
                return Ok(DispatchOutcome::Offline);
            }
            MachineState::Quiescing => {
                return self.drain(machine.id()).await;
            }
            MachineState::Online => {}
        }

        let running = self.store.count_running_jobs(machine.id()).await?;
        let ceiling = self.settings.max_local_jobs;
        if running >= ceiling {
            tracing::info!(hostname = %hostname, running, ceiling, "machine at capacity");
            return Ok(DispatchOutcome::AtCapacity { running, ceiling });
        }

        let Some(job_id) = self
            .scheduler
            .get_job_for_machine(hostname, self.settings.worker_limit)
            .await?
        else {
            tracing::info!(hostname = %hostname, "no work");
            return Ok(DispatchOutcome::NoWork);
        };

        self.launcher
            .launch(job_id)
            .map_err(|err| DispatcherError::Launch {
                job_id,
                source: Arc::new(err),
            })?;
        Ok(DispatchOutcome::Launched(job_id))
    }

    async fn drain(&self, machine_id: MachineId) -> DispatcherResult<DispatchOutcome> {
        let hostname = &self.settings.hostname;
        match self
            .store
            .offline_if_drained(machine_id, self.clock.utc())
            .await?
        {
            DrainCheck::WentOffline(_) => {
                tracing::info!(hostname = %hostname, "quiescing machine drained; now offline");
                Ok(DispatchOutcome::WentOffline)
            }
            DrainCheck::StillRunning(running) => {
                tracing::info!(hostname = %hostname, running, "machine quiescing; waiting for jobs");
                Ok(DispatchOutcome::Draining { running })
            }
            DrainCheck::NotQuiescing(state) => {
                tracing::info!(hostname = %hostname, %state, "machine changed state during drain check");
                Ok(if state == MachineState::Offline {
                    DispatchOutcome::Offline
                } else {
                    DispatchOutcome::NoWork
                })
            }
        }
    }
}
