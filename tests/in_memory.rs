//! In-memory integration tests for code import coordination.
//!
//! Tests are organized into modules by functionality:
//! - `assignment_tests`: Concurrent claims and worker limits
//! - `lifecycle_tests`: A job from approval through finish and rescheduling

mod in_memory {
    pub mod helpers;

    mod assignment_tests;
    mod lifecycle_tests;
}
