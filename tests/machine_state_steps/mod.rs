//! Step definitions for machine state scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
