//! Application services for code import coordination.

mod machines;
mod scheduler;
mod workflow;

pub use machines::{MachineAdminError, MachineAdminResult, MachineAdminService, MachineStatus};
pub use scheduler::{
    DEFAULT_CONSECUTIVE_FAILURE_LIMIT, SchedulerError, SchedulerPolicy, SchedulerResult,
    SchedulerService,
};
pub use workflow::{
    JobWorkflow, RunNowOutcome, ScanOutcome, ScanSummary, WorkflowError, WorkflowResult,
};
