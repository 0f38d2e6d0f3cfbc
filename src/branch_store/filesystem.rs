//! Branch store backed by a local directory tree.
//!
//! Each mirror lives at `<root>/<owner>/<project>/<branch>` and carries an
//! empty [`IMPORT_MARKER`] file written when the import system first
//! created it. Directories without the marker are never read or
//! overwritten.

use super::{
    domain::ImportBranchRef,
    ports::{BranchStore, BranchStoreError, BranchStoreResult, PullOutcome, PushOutcome},
};
use async_trait::async_trait;
use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use std::io;

/// Marker file identifying directories created by the import system.
pub const IMPORT_MARKER: &str = ".codeimport";

/// Branch store rooted at a capability directory.
#[derive(Debug)]
pub struct FilesystemBranchStore {
    root: Dir,
}

impl FilesystemBranchStore {
    /// Opens the store at `root`, creating the directory when missing.
    ///
    /// # Errors
    ///
    /// Returns [`BranchStoreError::Io`] when the directory cannot be created
    /// or opened.
    pub fn open(root: &Utf8Path) -> BranchStoreResult<Self> {
        Ok(Self {
            root: open_or_create(root)?,
        })
    }

    async fn run_blocking<T, F>(&self, operation: F) -> BranchStoreResult<T>
    where
        F: FnOnce(&Dir) -> BranchStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let root = self.root.try_clone().map_err(BranchStoreError::io)?;
        tokio::task::spawn_blocking(move || operation(&root))
            .await
            .map_err(BranchStoreError::io)?
    }
}

#[async_trait]
impl BranchStore for FilesystemBranchStore {
    async fn pull(
        &self,
        branch: &ImportBranchRef,
        target_path: &Utf8Path,
    ) -> BranchStoreResult<PullOutcome> {
        let owned_branch = branch.clone();
        let target = target_path.to_owned();
        let outcome = self
            .run_blocking(move |root| pull_blocking(root, &owned_branch, &target))
            .await?;
        tracing::info!(branch = %branch, path = %target_path, ?outcome, "pulled mirror");
        Ok(outcome)
    }

    async fn push(
        &self,
        branch: &ImportBranchRef,
        local_tree: &Utf8Path,
    ) -> BranchStoreResult<PushOutcome> {
        let owned_branch = branch.clone();
        let source = local_tree.to_owned();
        let outcome = self
            .run_blocking(move |root| push_blocking(root, &owned_branch, &source))
            .await?;
        tracing::info!(
            branch = %branch,
            created = outcome.created,
            files = outcome.files,
            removed = outcome.removed,
            "pushed mirror"
        );
        Ok(outcome)
    }
}

/// Creates `path` when missing and opens it.
pub(crate) fn open_or_create(path: &Utf8Path) -> BranchStoreResult<Dir> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(BranchStoreError::io)?;
    Dir::open_ambient_dir(path, ambient_authority()).map_err(BranchStoreError::io)
}

fn pull_blocking(
    root: &Dir,
    branch: &ImportBranchRef,
    target_path: &Utf8Path,
) -> BranchStoreResult<PullOutcome> {
    let local = open_or_create(target_path)?;
    let relative = branch.relative_path();
    if !root.exists(&relative) {
        return Ok(PullOutcome::Created);
    }
    let remote = open_managed(root, branch, &relative)?;
    let files = copy_tree(&remote, &local, true).map_err(BranchStoreError::io)?;
    Ok(PullOutcome::Pulled { files })
}

fn push_blocking(
    root: &Dir,
    branch: &ImportBranchRef,
    local_tree: &Utf8Path,
) -> BranchStoreResult<PushOutcome> {
    let local =
        Dir::open_ambient_dir(local_tree, ambient_authority()).map_err(BranchStoreError::io)?;
    let relative = branch.relative_path();
    let created = !root.exists(&relative);
    if created {
        root.create_dir_all(&relative)
            .map_err(BranchStoreError::io)?;
        root.write(relative.join(IMPORT_MARKER), b"")
            .map_err(BranchStoreError::io)?;
    }
    let remote = open_managed(root, branch, &relative)?;
    let files = copy_tree(&local, &remote, true).map_err(BranchStoreError::io)?;
    let removed = prune_tree(&remote, &local, true).map_err(BranchStoreError::io)?;
    Ok(PushOutcome {
        created,
        files,
        removed,
    })
}

fn open_managed(
    root: &Dir,
    branch: &ImportBranchRef,
    relative: &Utf8Path,
) -> BranchStoreResult<Dir> {
    if !root.is_dir(relative) {
        return Err(BranchStoreError::NotImportManaged(branch.clone()));
    }
    let remote = root.open_dir(relative).map_err(BranchStoreError::io)?;
    if !remote.is_file(IMPORT_MARKER) {
        return Err(BranchStoreError::NotImportManaged(branch.clone()));
    }
    Ok(remote)
}

struct Entry {
    name: String,
    is_dir: bool,
    is_file: bool,
}

fn list_entries(dir: &Dir, at_root: bool) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in dir.entries()? {
        let dir_entry = item?;
        let name = dir_entry.file_name()?;
        if at_root && name == IMPORT_MARKER {
            continue;
        }
        let file_type = dir_entry.file_type()?;
        entries.push(Entry {
            name,
            is_dir: file_type.is_dir(),
            is_file: file_type.is_file(),
        });
    }
    Ok(entries)
}

fn copy_tree(source: &Dir, destination: &Dir, at_root: bool) -> io::Result<usize> {
    let mut copied = 0;
    for entry in list_entries(source, at_root)? {
        if entry.is_dir {
            destination.create_dir_all(&entry.name)?;
            let child_source = source.open_dir(&entry.name)?;
            let child_destination = destination.open_dir(&entry.name)?;
            copied += copy_tree(&child_source, &child_destination, false)?;
        } else if entry.is_file {
            source.copy(&entry.name, destination, &entry.name)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn prune_tree(destination: &Dir, source: &Dir, at_root: bool) -> io::Result<usize> {
    let mut removed = 0;
    for entry in list_entries(destination, at_root)? {
        if entry.is_dir && source.is_dir(&entry.name) {
            let child_destination = destination.open_dir(&entry.name)?;
            let child_source = source.open_dir(&entry.name)?;
            removed += prune_tree(&child_destination, &child_source, false)?;
        } else if entry.is_dir {
            destination.remove_dir_all(&entry.name)?;
            removed += 1;
        } else if !source.is_file(&entry.name) {
            destination.remove_file(&entry.name)?;
            removed += 1;
        }
    }
    Ok(removed)
}
