//! Storage of uploaded worker logs.

use crate::jobs::domain::LogArtifactId;
use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::{fs::OpenOptions, fs_utf8::Dir};
use sha2::{Digest, Sha256};
use std::{io, io::Write, sync::Arc};
use thiserror::Error;

/// Attempts at allocating a fresh artifact id before giving up.
const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Errors returned by artifact stores.
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    /// The artifact name is unusable.
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),
    /// No free identifier could be allocated.
    #[error("could not allocate an artifact id")]
    Exhausted,
    /// Storage failure.
    #[error("artifact store I/O error: {0}")]
    Io(Arc<dyn std::error::Error + Send + Sync>),
}

impl ArtifactError {
    /// Wraps an I/O error.
    pub fn io(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Io(Arc::new(err))
    }
}

/// Uploaded log metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Identifier reported to the scheduler.
    pub id: LogArtifactId,
    /// Hex SHA-256 digest of the contents.
    pub sha256: String,
}

/// Destination for worker logs.
#[async_trait]
pub trait LogArtifactStore: Send + Sync {
    /// Stores `contents` under `name` and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] when the contents cannot be stored.
    async fn upload(&self, name: &str, contents: Vec<u8>) -> Result<StoredArtifact, ArtifactError>;
}

/// Stores logs as `<id>-<name>` files with a `.sha256` digest alongside.
#[derive(Debug)]
pub struct FilesystemLogArtifactStore {
    root: Dir,
}

impl FilesystemLogArtifactStore {
    /// Opens the store at `root`, creating the directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] when the directory cannot be opened.
    pub fn open(root: &Utf8Path) -> Result<Self, ArtifactError> {
        let dir = crate::branch_store::filesystem::open_or_create(root)
            .map_err(ArtifactError::io)?;
        Ok(Self { root: dir })
    }
}

#[async_trait]
impl LogArtifactStore for FilesystemLogArtifactStore {
    async fn upload(&self, name: &str, contents: Vec<u8>) -> Result<StoredArtifact, ArtifactError> {
        if name.is_empty() || name.contains('/') || name.starts_with('.') {
            return Err(ArtifactError::InvalidName(name.to_owned()));
        }
        let root = self.root.try_clone().map_err(ArtifactError::io)?;
        let owned_name = name.to_owned();
        let stored = tokio::task::spawn_blocking(move || store_blocking(&root, &owned_name, &contents))
            .await
            .map_err(ArtifactError::io)??;
        tracing::info!(artifact_id = %stored.id, sha256 = %stored.sha256, artifact_name = name, "uploaded log");
        Ok(stored)
    }
}

fn store_blocking(root: &Dir, name: &str, contents: &[u8]) -> Result<StoredArtifact, ArtifactError> {
    let sha256 = hex_digest(contents);
    let mut candidate = next_free_id(root).map_err(ArtifactError::io)?;
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let id = LogArtifactId::new(candidate).map_err(ArtifactError::io)?;
        let file_name = format!("{id}-{name}");
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        match root.open_with(&file_name, &options) {
            Ok(mut file) => {
                file.write_all(contents).map_err(ArtifactError::io)?;
                root.write(format!("{file_name}.sha256"), format!("{sha256}  {name}\n"))
                    .map_err(ArtifactError::io)?;
                return Ok(StoredArtifact { id, sha256 });
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                candidate = candidate.saturating_add(1);
            }
            Err(err) => return Err(ArtifactError::io(err)),
        }
    }
    Err(ArtifactError::Exhausted)
}

fn next_free_id(root: &Dir) -> io::Result<i64> {
    let mut highest = 0_i64;
    for item in root.entries()? {
        let file_name = item?.file_name()?;
        let parsed = file_name
            .split_once('-')
            .and_then(|(prefix, _)| prefix.parse::<i64>().ok());
        if let Some(id) = parsed {
            highest = highest.max(id);
        }
    }
    Ok(highest.saturating_add(1))
}

fn hex_digest(contents: &[u8]) -> String {
    Sha256::digest(contents)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
