//! In-memory adapters for code import coordination.

mod store;

pub use store::InMemoryCodeImportStore;
