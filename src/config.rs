//! TOML configuration shared by the scheduler, dispatcher and worker
//! binaries.
//!
//! Every field has a default so an empty file, or no file at all, yields a
//! usable local setup. The path comes from `--config` or the
//! [`CONFIG_ENV`] environment variable.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use std::{io, sync::Arc, time::Duration};
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CODEIMPORT_CONFIG";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read configuration {path}: {source}")]
    Read {
        /// File that was read.
        path: Utf8PathBuf,
        /// Underlying error.
        source: Arc<io::Error>,
    },
    /// The file is not valid TOML for this schema.
    #[error("invalid configuration {path}: {source}")]
    Parse {
        /// File that was parsed.
        path: Utf8PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A setting with no default was not provided.
    #[error("missing configuration setting {0}")]
    Missing(&'static str),
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `[scheduler]` section.
    pub scheduler: SchedulerConfig,
    /// `[dispatcher]` section.
    pub dispatcher: DispatcherConfig,
    /// `[worker]` section.
    pub worker: WorkerConfig,
}

impl Config {
    /// Loads the file at `path`, or at [`CONFIG_ENV`] when `path` is `None`.
    /// Without either, the defaults are returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] when the
    /// named file cannot be used.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(CONFIG_ENV).ok().map(Utf8PathBuf::from);
        match path.map(Utf8Path::to_path_buf).or(from_env) {
            Some(config_path) => Self::read(&config_path),
            None => Ok(Self::default()),
        }
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn read(path: &Utf8Path) -> Result<Self, ConfigError> {
        let read_error = |err: io::Error| ConfigError::Read {
            path: path.to_owned(),
            source: Arc::new(err),
        };
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().ok_or_else(|| {
            read_error(io::Error::new(io::ErrorKind::InvalidInput, "path names no file"))
        })?;
        let text = Dir::open_ambient_dir(parent, ambient_authority())
            .and_then(|dir| dir.read_to_string(file_name))
            .map_err(read_error)?;
        let config = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!(path = %path, "loaded configuration");
        Ok(config)
    }

    /// Parses configuration text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed text or unknown keys.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// `[scheduler]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Socket address the RPC server binds.
    pub listen_address: String,
    /// `PostgreSQL` URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Base URL under which import mirrors are published.
    pub branch_base_url: String,
    /// Consecutive failures after which an import is marked failing.
    pub consecutive_failure_limit: u32,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8480".to_owned(),
            database_url: None,
            branch_base_url: DEFAULT_BRANCH_BASE_URL.to_owned(),
            consecutive_failure_limit: 5,
            pool_size: 4,
        }
    }
}

/// `[dispatcher]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherConfig {
    /// Scheduler RPC base URL.
    pub scheduler_url: String,
    /// `PostgreSQL` URL used to read the machine's state.
    pub database_url: Option<String>,
    /// Hostname override; the OS hostname is used when absent.
    pub hostname: Option<String>,
    /// Limit sent to the scheduler with each claim.
    pub worker_limit: usize,
    /// Local ceiling on running jobs.
    pub max_local_jobs: usize,
    /// Worker binary started for claimed jobs.
    pub worker_program: Utf8PathBuf,
    /// Directory receiving `<job_id>.log` worker logs.
    pub log_dir: Utf8PathBuf,
    /// RPC timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl DispatcherConfig {
    /// Returns the database URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when none is configured.
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("dispatcher.database_url"))
    }

    /// Returns the RPC timeout.
    #[must_use]
    pub const fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            scheduler_url: DEFAULT_SCHEDULER_URL.to_owned(),
            database_url: None,
            hostname: None,
            worker_limit: 4,
            max_local_jobs: 4,
            worker_program: Utf8PathBuf::from("import_worker"),
            log_dir: Utf8PathBuf::from("/var/tmp/codeimport/logs"),
            rpc_timeout_secs: 30,
        }
    }
}

/// `[worker]` settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    /// Scheduler RPC base URL.
    pub scheduler_url: String,
    /// Directory backing the branch store.
    pub branch_store_root: Utf8PathBuf,
    /// Base URL branch URLs are resolved against.
    pub branch_base_url: String,
    /// Directory for per-job scratch space.
    pub scratch_root: Utf8PathBuf,
    /// Directory holding lease files.
    pub lease_dir: Utf8PathBuf,
    /// Directory receiving uploaded logs.
    pub artifact_dir: Utf8PathBuf,
    /// Seconds between heartbeats.
    pub heartbeat_interval_secs: u64,
    /// RPC timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl WorkerConfig {
    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the RPC timeout.
    #[must_use]
    pub const fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scheduler_url: DEFAULT_SCHEDULER_URL.to_owned(),
            branch_store_root: Utf8PathBuf::from("/var/tmp/codeimport/branches"),
            branch_base_url: DEFAULT_BRANCH_BASE_URL.to_owned(),
            scratch_root: Utf8PathBuf::from("/var/tmp/codeimport/scratch"),
            lease_dir: Utf8PathBuf::from("/var/tmp/codeimport/leases"),
            artifact_dir: Utf8PathBuf::from("/var/tmp/codeimport/artifacts"),
            heartbeat_interval_secs: 30,
            rpc_timeout_secs: 30,
        }
    }
}

const DEFAULT_SCHEDULER_URL: &str = "http://127.0.0.1:8480";
const DEFAULT_BRANCH_BASE_URL: &str = "http://branches.localhost/";
