//! Dispatcher: the per-host loop body that claims jobs and starts workers.
//!
//! Each invocation is stateless. It reads the local machine's state from
//! the store, drains a quiescing machine, applies the local job ceiling and
//! claims at most one job through the scheduler RPC surface.

mod cycle;
mod launcher;

pub use cycle::{
    DispatchOutcome, Dispatcher, DispatcherError, DispatcherResult, DispatcherSettings,
};
#[cfg(test)]
pub use launcher::MockWorkerLauncher;
pub use launcher::{ProcessWorkerLauncher, WorkerLauncher};

#[cfg(test)]
mod tests;
