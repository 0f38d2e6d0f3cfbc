//! Codeimport: coordination of foreign VCS imports across a worker fleet.
//!
//! A central scheduler hands out import jobs to registered machines,
//! dispatchers on those machines start workers, and workers mirror the
//! foreign repository into the branch store while reporting heartbeats.
//!
//! # Architecture
//!
//! Codeimport follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, RPC, etc.)
//!
//! # Modules
//!
//! - [`jobs`]: Machines, import configurations, jobs and the scheduler
//! - [`dispatcher`]: Per-host claiming of jobs and worker launch
//! - [`worker`]: Running a single import job
//! - [`branch_store`]: Mirror storage and scoped leases
//! - [`config`]: TOML configuration for the binaries
//! - [`telemetry`]: Logging setup

pub mod branch_store;
pub mod config;
pub mod dispatcher;
pub mod jobs;
pub mod telemetry;
pub mod worker;
