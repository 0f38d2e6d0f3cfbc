//! Logging setup for the binaries.
//!
//! Verbosity comes from repeated `-v`/`-q` flags around an INFO default;
//! `RUST_LOG` replaces the computed filter entirely when set.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs::OpenOptions, fs_utf8::Dir};
use clap::ArgAction;
use std::{io, sync::Mutex};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log file could not be opened.
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        /// Requested log file.
        path: String,
        /// Underlying error.
        source: io::Error,
    },
    /// A global subscriber is already installed.
    #[error("failed to install logging: {0}")]
    Install(String),
}

/// `-v` and `-q` flags shared by every binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::Args)]
pub struct VerbosityArgs {
    /// Log more; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Log less; repeat to silence warnings.
    #[arg(short, long, action = ArgAction::Count, global = true, conflicts_with = "verbose")]
    pub quiet: u8,
}

impl VerbosityArgs {
    /// Returns the level selected by the flags.
    #[must_use]
    pub fn level(self) -> LevelFilter {
        match i16::from(self.verbose) - i16::from(self.quiet) {
            ..=-3 => LevelFilter::OFF,
            -2 => LevelFilter::ERROR,
            -1 => LevelFilter::WARN,
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()))
}

/// Logs to standard error.
///
/// # Errors
///
/// Returns [`TelemetryError::Install`] when a subscriber is already set.
pub fn init_stderr(level: LevelFilter) -> Result<(), TelemetryError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))
}

/// Logs to `path`, appending, without ANSI colours. The worker's heartbeat
/// reads the tail of this file.
///
/// # Errors
///
/// Returns [`TelemetryError::LogFile`] when the file cannot be opened and
/// [`TelemetryError::Install`] when a subscriber is already set.
pub fn init_log_file(level: LevelFilter, path: &Utf8Path) -> Result<(), TelemetryError> {
    let log_error = |source: io::Error| TelemetryError::LogFile {
        path: path.to_string(),
        source,
    };
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| log_error(io::Error::new(io::ErrorKind::InvalidInput, "path names no file")))?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(log_error)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(log_error)?;
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    let file = dir
        .open_with(file_name, &options)
        .map_err(log_error)?
        .into_std();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|err| TelemetryError::Install(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::VerbosityArgs;
    use clap::Parser;
    use rstest::rstest;
    use tracing_subscriber::filter::LevelFilter;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        verbosity: VerbosityArgs,
    }

    #[rstest]
    #[case(&[], LevelFilter::INFO)]
    #[case(&["-v"], LevelFilter::DEBUG)]
    #[case(&["-vv"], LevelFilter::TRACE)]
    #[case(&["-vvvv"], LevelFilter::TRACE)]
    #[case(&["-q"], LevelFilter::WARN)]
    #[case(&["-qq"], LevelFilter::ERROR)]
    #[case(&["-q", "-q", "-q"], LevelFilter::OFF)]
    fn flags_select_the_level(#[case] flags: &[&str], #[case] expected: LevelFilter) {
        let cli = Cli::try_parse_from(std::iter::once("prog").chain(flags.iter().copied()))
            .expect("flags parse");

        assert_eq!(cli.verbosity.level(), expected);
    }

    #[rstest]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["prog", "-v", "-q"]).is_err());
    }
}
