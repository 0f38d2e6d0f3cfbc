//! `PostgreSQL` adapters for code import persistence.

mod models;
mod repository;
mod schema;

pub use repository::{CodeImportPgPool, PostgresCodeImportStore};
