//! Starting detached worker processes.

use crate::{jobs::domain::JobId, worker::CommandSpec};
use camino::{Utf8Path, Utf8PathBuf};
use std::{io, process::Stdio};

/// Starts a worker for a claimed job.
#[cfg_attr(test, mockall::automock)]
pub trait WorkerLauncher: Send + Sync {
    /// Starts a worker for `job_id` and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the process cannot be started.
    fn launch(&self, job_id: JobId) -> io::Result<()>;
}

/// Launches `<program> <job_id> --log-file <log_dir>/<job_id>.log` in its
/// own process group with null standard streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessWorkerLauncher {
    program: Utf8PathBuf,
    log_dir: Utf8PathBuf,
    extra_args: Vec<String>,
}

impl ProcessWorkerLauncher {
    /// Creates a launcher for the worker binary at `program`.
    #[must_use]
    pub fn new(program: impl Into<Utf8PathBuf>, log_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            log_dir: log_dir.into(),
            extra_args: Vec::new(),
        }
    }

    /// Appends arguments passed to every worker, e.g. `--config PATH`.
    #[must_use]
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the log file a worker for `job_id` writes.
    #[must_use]
    pub fn log_file(&self, job_id: JobId) -> Utf8PathBuf {
        self.log_dir.join(format!("{job_id}.log"))
    }

    /// Returns the command line used for `job_id`.
    #[must_use]
    pub fn command_for(&self, job_id: JobId) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program.as_str())
            .arg(job_id.to_string())
            .arg("--log-file")
            .arg(self.log_file(job_id).as_str());
        for extra in &self.extra_args {
            spec = spec.arg(extra.as_str());
        }
        spec
    }

    /// Returns the configured log directory.
    #[must_use]
    pub fn log_dir(&self) -> &Utf8Path {
        &self.log_dir
    }
}

impl WorkerLauncher for ProcessWorkerLauncher {
    fn launch(&self, job_id: JobId) -> io::Result<()> {
        let spec = self.command_for(job_id);
        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // The worker outlives the dispatcher in its own process group.
        #[cfg(unix)]
        command.process_group(0);
        let child = command.spawn()?;
        tracing::info!(job_id = %job_id, pid = ?child.id(), command = %spec, "launched worker");
        Ok(())
    }
}
