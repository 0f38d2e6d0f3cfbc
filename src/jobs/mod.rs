//! Code import job coordination.
//!
//! This module owns the scheduler side of the system: worker machines and
//! their drain-aware state machine, import configurations, the one job each
//! reviewed import carries, results and the audit trail. The
//! [`services::SchedulerService`] is the only component that assigns work;
//! dispatchers and workers reach it through the
//! [`ports::SchedulerClient`] port.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
