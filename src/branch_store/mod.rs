//! Branch store: where import mirrors live between runs.
//!
//! Workers pull the previous mirror of an import into a scratch directory,
//! update it from the foreign repository and push it back. Scoped leases
//! keep two workers from updating the same mirror at once.

pub mod domain;
pub mod filesystem;
pub mod lease;
pub mod ports;

pub use domain::ImportBranchRef;
pub use filesystem::{FilesystemBranchStore, IMPORT_MARKER};
pub use lease::{LeaseError, LeaseGuard, LeaseManager, LeaseResult};
pub use ports::{BranchStore, BranchStoreError, BranchStoreResult, PullOutcome, PushOutcome};

#[cfg(test)]
mod tests;
