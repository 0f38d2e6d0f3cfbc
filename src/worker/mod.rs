//! Import worker: runs one code import job on a worker host.
//!
//! The worker fetches its import data from the scheduler, pulls the
//! previous mirror under a lease, updates it with the VCS tools, pushes it
//! back and reports a terminal status. A heartbeat task reports the log
//! tail meanwhile; losing the job to reclamation abandons the run quietly.

pub mod artifacts;
pub mod command;
pub mod fetch;
pub mod log_tail;
mod supervisor;

pub use artifacts::{ArtifactError, FilesystemLogArtifactStore, LogArtifactStore, StoredArtifact};
pub use command::{CommandOutput, CommandRunner, CommandSpec, TokioCommandRunner, shell_escape};
pub use fetch::{FetchError, FetchOutcome, FetchStrategy, Fetcher, strategy_for};
pub use supervisor::{
    ImportFailure, ImportWorker, WorkerCollaborators, WorkerError, WorkerOutcome, WorkerSettings,
    report_setup_failure,
};

#[cfg(test)]
mod tests;
