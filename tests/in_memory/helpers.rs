//! Shared helpers for in-memory integration tests.

use codeimport::jobs::{
    adapters::memory::InMemoryCodeImportStore,
    domain::{Hostname, ImportId, ImportSource, JobId, NewImport, TargetBranch, VcsKind},
    services::{JobWorkflow, MachineAdminService, SchedulerPolicy, SchedulerService},
};
use mockable::DefaultClock;
use rstest::fixture;
use std::sync::Arc;

/// Scheduler service over the in-memory store.
pub type TestScheduler = SchedulerService<InMemoryCodeImportStore, DefaultClock>;

/// Services sharing one in-memory store.
pub struct Site {
    pub store: Arc<InMemoryCodeImportStore>,
    pub scheduler: Arc<TestScheduler>,
    pub machines: MachineAdminService<InMemoryCodeImportStore, DefaultClock>,
    pub workflow: JobWorkflow<InMemoryCodeImportStore, DefaultClock>,
}

/// Provides services over a fresh store.
#[fixture]
pub fn site() -> Site {
    let store = Arc::new(InMemoryCodeImportStore::new());
    let clock = Arc::new(DefaultClock);
    Site {
        scheduler: Arc::new(SchedulerService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            SchedulerPolicy::new("http://branches.example.org/"),
        )),
        machines: MachineAdminService::new(Arc::clone(&store), Arc::clone(&clock)),
        workflow: JobWorkflow::new(Arc::clone(&store), clock),
        store,
    }
}

impl Site {
    /// Registers `name` and brings it online.
    ///
    /// # Errors
    ///
    /// Returns an error if the hostname is invalid or a transition fails.
    pub async fn online_machine(&self, name: &str) -> Result<Hostname, eyre::Report> {
        let hostname = Hostname::new(name)?;
        self.machines.register(&hostname).await?;
        self.machines.start(&hostname, None).await?;
        Ok(hostname)
    }

    /// Creates and approves a Git import into `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the import cannot be created or approved.
    pub async fn approved_import(&self, target: &str) -> Result<(ImportId, JobId), eyre::Report> {
        let import = self
            .workflow
            .create_import(NewImport::new(
                ImportSource::from_url(VcsKind::Git, format!("https://git.example.org/{target}"))?,
                TargetBranch::new(target)?,
            ))
            .await?;
        let job = self.workflow.approve(import.id()).await?;
        Ok((import.id(), job.id()))
    }
}
