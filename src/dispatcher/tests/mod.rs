//! Unit tests for the dispatcher.

mod launcher_tests;
