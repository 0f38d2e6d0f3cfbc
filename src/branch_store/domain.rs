//! Branch references resolved from scheduler branch URLs.

use super::ports::BranchStoreError;
use crate::jobs::domain::TargetBranch;
use camino::Utf8PathBuf;
use std::fmt;

/// Location of an import's mirror inside the branch store.
///
/// Always a three-segment `owner/project/branch` relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportBranchRef(TargetBranch);

impl ImportBranchRef {
    /// Wraps an already validated target branch.
    #[must_use]
    pub const fn from_target(target: TargetBranch) -> Self {
        Self(target)
    }

    /// Resolves a branch URL handed out by the scheduler against the branch
    /// store base URL.
    ///
    /// # Errors
    ///
    /// Returns [`BranchStoreError::OutsideBaseUrl`] when `branch_url` is not
    /// below `base_url` and [`BranchStoreError::InvalidBranchPath`] when the
    /// remainder is not a three-segment path.
    pub fn from_branch_url(base_url: &str, branch_url: &str) -> Result<Self, BranchStoreError> {
        let base = base_url.trim_end_matches('/');
        let relative = branch_url
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| BranchStoreError::OutsideBaseUrl {
                url: branch_url.to_owned(),
                base: base.to_owned(),
            })?;
        if relative.starts_with('~') {
            return Err(BranchStoreError::InvalidBranchPath(relative.to_owned()));
        }
        TargetBranch::new(relative)
            .map(Self)
            .map_err(|_| BranchStoreError::InvalidBranchPath(relative.to_owned()))
    }

    /// Returns the target branch.
    #[must_use]
    pub const fn target(&self) -> &TargetBranch {
        &self.0
    }

    /// Returns the path of the mirror relative to the store root.
    #[must_use]
    pub fn relative_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.0.as_str())
    }
}

impl fmt::Display for ImportBranchRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, formatter)
    }
}
