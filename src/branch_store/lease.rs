//! Exclusive scoped leases backed by advisory file locks.
//!
//! Each key maps to a lock file in the lease directory. A lease is held
//! while its holder keeps an exclusive, non-blocking lock on that file. The
//! kernel drops the lock when the holding process exits, however it exits,
//! so a worker that dies mid-run leaves only an unlocked file behind. Lock
//! files stay between runs and record the current holder's process id.

use camino::Utf8Path;
use cap_std::{fs::OpenOptions, fs_utf8::Dir};
use std::{fmt, fs::File, future::Future, io, io::Write, sync::Arc};
use thiserror::Error;

#[cfg(unix)]
type LockedFile = nix::fcntl::Flock<File>;

#[cfg(not(unix))]
type LockedFile = File;

/// Result type for lease operations.
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Errors returned while acquiring leases.
#[derive(Debug, Clone, Error)]
pub enum LeaseError {
    /// Another holder owns the lease.
    #[error("lease '{0}' is already held")]
    Held(String),

    /// The lock file could not be opened, locked or written.
    #[error("lease I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl LeaseError {
    fn io(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Hands out leases stored in one directory.
#[derive(Debug)]
pub struct LeaseManager {
    root: Dir,
}

impl LeaseManager {
    /// Opens the lease directory at `root`, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Io`] when the directory cannot be opened.
    pub fn open(root: &Utf8Path) -> LeaseResult<Self> {
        let dir = super::filesystem::open_or_create(root)
            .map_err(|err| LeaseError::io(io::Error::other(err.to_string())))?;
        Ok(Self { root: dir })
    }

    /// Acquires the lease for `key`. The lease is released when the guard
    /// drops or the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Held`] when a live holder has the lease.
    pub fn acquire(&self, key: &str) -> LeaseResult<LeaseGuard> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        let opened = self
            .root
            .open_with(lease_file_name(key), &options)
            .map_err(LeaseError::io)?;
        let mut locked = lock_exclusive(opened.into_std()).map_err(|err| {
            if err.kind() == io::ErrorKind::WouldBlock {
                LeaseError::Held(key.to_owned())
            } else {
                LeaseError::io(err)
            }
        })?;
        locked.set_len(0).map_err(LeaseError::io)?;
        writeln!(locked, "{}", std::process::id()).map_err(LeaseError::io)?;
        tracing::debug!(lease = %key, "acquired lease");
        Ok(LeaseGuard {
            file: locked,
            key: key.to_owned(),
        })
    }

    /// Runs `body` while holding the lease for `key`, releasing it on every
    /// exit path.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Held`] without running `body` when the lease is
    /// taken.
    pub async fn scoped<F, Fut, T>(&self, key: &str, body: F) -> LeaseResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key)?;
        Ok(body().await)
    }
}

/// Held lease; dropping it unlocks the lock file.
pub struct LeaseGuard {
    file: LockedFile,
    key: String,
}

impl LeaseGuard {
    /// Returns the leased key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for LeaseGuard {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LeaseGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        // The lock itself goes with `file`; only the holder id is cleared.
        match self.file.set_len(0) {
            Ok(()) => tracing::debug!(lease = %self.key, "released lease"),
            Err(err) => {
                tracing::warn!(lease = %self.key, error = %err, "failed to clear lease holder");
            }
        }
    }
}

#[cfg(unix)]
fn lock_exclusive(file: File) -> io::Result<LockedFile> {
    nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusiveNonblock)
        .map_err(|(_, errno)| io::Error::from(errno))
}

#[cfg(not(unix))]
fn lock_exclusive(file: File) -> io::Result<LockedFile> {
    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(std::fs::TryLockError::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
        Err(std::fs::TryLockError::Error(err)) => Err(err),
    }
}

/// Escapes every character outside `[A-Za-z0-9._-]` so distinct keys never
/// share a file.
pub(crate) fn lease_file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 6);
    for character in key.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | '.') {
            name.push(character);
        } else {
            name.push_str(&format!("%{:06x}", u32::from(character)));
        }
    }
    name.push_str(".lease");
    name
}
