//! Per-VCS fetch strategies that update a bare Git mirror by running
//! external tools, and classification of their failures.

use super::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::jobs::domain::{ImportSource, JobResultStatus};
use camino::Utf8Path;
use std::sync::Arc;
use thiserror::Error;

/// Program used for every mirror operation.
pub const GIT_PROGRAM: &str = "git";

/// Classified failure of a fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The foreign location is not a usable repository.
    #[error("invalid source: {0}")]
    Invalid(String),
    /// The foreign repository uses something the tools cannot import.
    #[error("unsupported feature: {0}")]
    Unsupported(String),
    /// Access was refused.
    #[error("access forbidden: {0}")]
    Forbidden(String),
    /// The foreign repository is unreachable or corrupt.
    #[error("remote broken: {0}")]
    RemoteBroken(String),
    /// The foreign history no longer extends the mirror.
    #[error("history diverged: {0}")]
    Diverged(String),
    /// Any other command failure.
    #[error("fetch failed: {0}")]
    Failed(String),
    /// The tool could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },
}

impl FetchError {
    /// Returns the terminal job status reported for this failure.
    ///
    /// Divergence needs an operator and is reported as a plain failure.
    #[must_use]
    pub const fn status(&self) -> JobResultStatus {
        match self {
            Self::Invalid(_) => JobResultStatus::FailureInvalid,
            Self::Unsupported(_) => JobResultStatus::FailureUnsupportedFeature,
            Self::Forbidden(_) => JobResultStatus::FailureForbidden,
            Self::RemoteBroken(_) => JobResultStatus::FailureRemoteBroken,
            Self::Diverged(_) | Self::Failed(_) | Self::Spawn { .. } => JobResultStatus::Failure,
        }
    }

    /// Classifies a failed command from its standard error.
    #[must_use]
    pub fn classify(command: &CommandSpec, output: &CommandOutput) -> Self {
        let stderr = output.stderr.to_ascii_lowercase();
        let last_line = output
            .stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no diagnostic output");
        let exit = output
            .exit_code
            .map_or_else(|| "killed by signal".to_owned(), |code| format!("exit {code}"));
        let message = format!("{command} ({exit}): {last_line}");
        let mentions = |needles: &[&str]| needles.iter().any(|needle| stderr.contains(needle));

        if mentions(&["non-fast-forward", "[rejected]", "diverged"]) {
            Self::Diverged(message)
        } else if mentions(&[
            "authentication failed",
            "authorization failed",
            "permission denied",
            "could not read username",
            "403",
            "401",
        ]) {
            Self::Forbidden(message)
        } else if mentions(&["not supported", "unsupported"]) {
            Self::Unsupported(message)
        } else if mentions(&[
            "could not resolve host",
            "connection refused",
            "connection reset",
            "timed out",
            "early eof",
            "corrupt",
            "unable to access",
        ]) {
            Self::RemoteBroken(message)
        } else if mentions(&[
            "repository not found",
            "does not appear to be a git repository",
            "not a valid",
            "no such repository",
            "cannot find module",
        ]) {
            Self::Invalid(message)
        } else {
            Self::Failed(message)
        }
    }
}

/// Plans the commands that bring a mirror up to date with its source.
pub trait FetchStrategy: Send + Sync {
    /// Returns the commands to run, in order, against `mirror`. `fresh` is
    /// set when the mirror was just created empty.
    fn plan(&self, mirror: &Utf8Path, fresh: bool) -> Vec<CommandSpec>;
}

/// CVS import through `git cvsimport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvsFetch {
    root: String,
    module: String,
}

impl FetchStrategy for CvsFetch {
    fn plan(&self, mirror: &Utf8Path, _fresh: bool) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(GIT_PROGRAM)
                .arg("cvsimport")
                .arg("-a")
                .arg("-i")
                .arg("-d")
                .arg(self.root.as_str())
                .arg("-C")
                .arg(mirror.as_str())
                .arg(self.module.as_str()),
        ]
    }
}

/// Subversion import through `git svn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnFetch {
    url: String,
}

impl FetchStrategy for SvnFetch {
    fn plan(&self, mirror: &Utf8Path, fresh: bool) -> Vec<CommandSpec> {
        let mut commands = Vec::with_capacity(2);
        if fresh {
            commands.push(git_dir(mirror).arg("svn").arg("init").arg(self.url.as_str()));
        }
        commands.push(git_dir(mirror).arg("svn").arg("fetch").arg("--quiet"));
        commands
    }
}

/// Git import by fetching branch heads without forced updates, so a
/// rewritten upstream history is rejected instead of silently replacing
/// the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitFetch {
    url: String,
}

impl FetchStrategy for GitFetch {
    fn plan(&self, mirror: &Utf8Path, _fresh: bool) -> Vec<CommandSpec> {
        vec![fetch_heads(mirror, self.url.as_str())]
    }
}

/// Bazaar import through the `bzr::` remote helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BzrFetch {
    url: String,
}

impl FetchStrategy for BzrFetch {
    fn plan(&self, mirror: &Utf8Path, _fresh: bool) -> Vec<CommandSpec> {
        vec![fetch_heads(mirror, &format!("bzr::{}", self.url))]
    }
}

fn git_dir(mirror: &Utf8Path) -> CommandSpec {
    CommandSpec::new(GIT_PROGRAM).arg(format!("--git-dir={mirror}"))
}

fn fetch_heads(mirror: &Utf8Path, remote: &str) -> CommandSpec {
    git_dir(mirror)
        .arg("fetch")
        .arg("--no-tags")
        .arg("--prune")
        .arg(remote)
        .arg("refs/heads/*:refs/heads/*")
}

/// Returns the strategy for a source.
#[must_use]
pub fn strategy_for(source: &ImportSource) -> Box<dyn FetchStrategy> {
    match source {
        ImportSource::Cvs { root, module } => Box::new(CvsFetch {
            root: root.clone(),
            module: module.clone(),
        }),
        ImportSource::Svn { url } => Box::new(SvnFetch { url: url.clone() }),
        ImportSource::Git { url } => Box::new(GitFetch { url: url.clone() }),
        ImportSource::Bzr { url } => Box::new(BzrFetch { url: url.clone() }),
    }
}

/// Whether a fetch changed the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Refs moved; the mirror must be pushed.
    Changed,
    /// Refs are unchanged.
    Unchanged,
}

/// Runs fetch strategies against a mirror.
pub struct Fetcher<R: CommandRunner> {
    runner: Arc<R>,
}

impl<R: CommandRunner> Fetcher<R> {
    /// Creates a fetcher using `runner`.
    #[must_use]
    pub const fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Updates `mirror` from its source and reports whether any ref moved.
    ///
    /// A fresh mirror is initialised as a bare repository first.
    ///
    /// # Errors
    ///
    /// Returns the classified [`FetchError`] of the first failing command.
    pub async fn fetch(
        &self,
        strategy: &dyn FetchStrategy,
        mirror: &Utf8Path,
        fresh: bool,
    ) -> Result<FetchOutcome, FetchError> {
        if fresh {
            self.run_checked(
                &CommandSpec::new(GIT_PROGRAM)
                    .arg("init")
                    .arg("--bare")
                    .arg("--quiet")
                    .arg(mirror.as_str()),
            )
            .await?;
        }
        let before = self.snapshot_refs(mirror).await?;
        for command in strategy.plan(mirror, fresh) {
            self.run_checked(&command).await?;
        }
        let after = self.snapshot_refs(mirror).await?;
        if before == after {
            Ok(FetchOutcome::Unchanged)
        } else {
            Ok(FetchOutcome::Changed)
        }
    }

    async fn snapshot_refs(&self, mirror: &Utf8Path) -> Result<String, FetchError> {
        self.run_checked(
            &git_dir(mirror)
                .arg("for-each-ref")
                .arg("--format=%(objectname) %(refname)"),
        )
        .await
        .map(|output| output.stdout)
    }

    async fn run_checked(&self, command: &CommandSpec) -> Result<CommandOutput, FetchError> {
        tracing::info!(command = %command, "running");
        let output = self
            .runner
            .run(command)
            .await
            .map_err(|err| FetchError::Spawn {
                program: command.program.clone(),
                source: Arc::new(err),
            })?;
        for line in output.stderr.lines().filter(|line| !line.trim().is_empty()) {
            tracing::info!(target: "codeimport::worker::output", "{line}");
        }
        if output.success() {
            Ok(output)
        } else {
            let failure = FetchError::classify(command, &output);
            tracing::warn!(error = %failure, "command failed");
            Err(failure)
        }
    }
}
