//! Port contracts for code import coordination.
//!
//! The store port is implemented by persistence adapters; the scheduler
//! client port is implemented by in-process and HTTP adapters.

pub mod rpc;
pub mod store;

#[cfg(test)]
pub use rpc::MockSchedulerClient;
#[cfg(test)]
pub use store::MockCodeImportStore;
pub use rpc::{ImportData, SchedulerClient, SchedulerRpcError, SchedulerRpcResult};
pub use store::{
    ClaimOutcome, CodeImportStore, CodeImportStoreError, CodeImportStoreResult, CompletedJob,
    DrainCheck, JobCompletion,
};
