//! Branch store port consumed by the worker.

use super::domain::ImportBranchRef;
use async_trait::async_trait;
use camino::Utf8Path;
use std::sync::Arc;
use thiserror::Error;

/// Result type for branch store operations.
pub type BranchStoreResult<T> = Result<T, BranchStoreError>;

/// Outcome of pulling a mirror into a local directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The previous mirror was copied.
    Pulled {
        /// Files copied.
        files: usize,
    },
    /// No mirror existed yet; an empty directory was created.
    Created,
}

/// Outcome of publishing a local tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Whether the remote location was created by this push.
    pub created: bool,
    /// Files copied.
    pub files: usize,
    /// Stale remote files removed.
    pub removed: usize,
}

/// Storage of import mirrors.
#[async_trait]
pub trait BranchStore: Send + Sync {
    /// Materialises the previous mirror of `branch` at `target_path`, or an
    /// empty directory on the first run.
    ///
    /// # Errors
    ///
    /// Returns [`BranchStoreError::NotImportManaged`] when the remote
    /// location exists but was not created by the import system.
    async fn pull(
        &self,
        branch: &ImportBranchRef,
        target_path: &Utf8Path,
    ) -> BranchStoreResult<PullOutcome>;

    /// Publishes `local_tree` as the mirror of `branch`, creating the remote
    /// location on first use.
    ///
    /// Files are copied one by one; an interrupted push is repaired by the
    /// next successful run.
    ///
    /// # Errors
    ///
    /// Returns [`BranchStoreError::NotImportManaged`] when the remote
    /// location exists but was not created by the import system.
    async fn push(
        &self,
        branch: &ImportBranchRef,
        local_tree: &Utf8Path,
    ) -> BranchStoreResult<PushOutcome>;
}

/// Errors returned by branch store implementations.
#[derive(Debug, Clone, Error)]
pub enum BranchStoreError {
    /// The remote location exists without the import marker.
    #[error("branch {0} exists but is not managed by the import system")]
    NotImportManaged(ImportBranchRef),

    /// The branch URL is not below the configured base URL.
    #[error("branch URL {url} is not below {base}")]
    OutsideBaseUrl {
        /// Rejected URL.
        url: String,
        /// Configured base URL.
        base: String,
    },

    /// The branch path is not a three-segment relative path.
    #[error("invalid branch path '{0}'")]
    InvalidBranchPath(String),

    /// Filesystem or transport failure.
    #[error("branch store I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl BranchStoreError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}
