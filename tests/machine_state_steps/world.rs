//! Shared world state for machine state BDD scenarios.

use std::sync::Arc;

use codeimport::{
    dispatcher::DispatchOutcome,
    jobs::{
        adapters::memory::InMemoryCodeImportStore,
        domain::{CodeImportMachine, Hostname, JobId},
        services::{
            JobWorkflow, MachineAdminError, MachineAdminService, SchedulerPolicy,
            SchedulerService,
        },
    },
};
use mockable::DefaultClock;
use rstest::fixture;

/// Scheduler type used by the BDD world.
pub type TestScheduler = SchedulerService<InMemoryCodeImportStore, DefaultClock>;

/// Scenario world for machine state behaviour tests.
pub struct MachineWorld {
    pub store: Arc<InMemoryCodeImportStore>,
    pub scheduler: Arc<TestScheduler>,
    pub machines: MachineAdminService<InMemoryCodeImportStore, DefaultClock>,
    pub workflow: JobWorkflow<InMemoryCodeImportStore, DefaultClock>,
    pub hostname: Option<Hostname>,
    pub claimed_job: Option<JobId>,
    pub last_claim: Option<Option<JobId>>,
    pub last_transition: Option<Result<CodeImportMachine, MachineAdminError>>,
    pub last_dispatch: Option<DispatchOutcome>,
}

impl MachineWorld {
    /// Creates a world over an empty store.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(InMemoryCodeImportStore::new());
        let clock = Arc::new(DefaultClock);
        Self {
            scheduler: Arc::new(SchedulerService::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                SchedulerPolicy::new("http://branches.example.org/"),
            )),
            machines: MachineAdminService::new(Arc::clone(&store), Arc::clone(&clock)),
            workflow: JobWorkflow::new(Arc::clone(&store), clock),
            store,
            hostname: None,
            claimed_job: None,
            last_claim: None,
            last_transition: None,
            last_dispatch: None,
        }
    }

    /// Returns the scenario's machine hostname.
    ///
    /// # Errors
    ///
    /// Returns an error when no machine was registered.
    pub fn hostname(&self) -> Result<Hostname, eyre::Report> {
        self.hostname
            .clone()
            .ok_or_else(|| eyre::eyre!("missing registered machine in scenario world"))
    }
}

impl Default for MachineWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> MachineWorld {
    MachineWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
