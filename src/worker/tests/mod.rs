//! Unit tests for the import worker.

mod fetch_tests;
mod supervisor_tests;

use super::command::{CommandOutput, CommandSpec, MockCommandRunner};
use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

/// Creates a fresh directory under the system temp dir.
pub(super) fn temp_dir(prefix: &str) -> Utf8PathBuf {
    let base = Utf8PathBuf::try_from(std::env::temp_dir()).expect("temp dir should be UTF-8");
    let name = format!("{prefix}_{}", uuid::Uuid::new_v4());
    let base_dir =
        Dir::open_ambient_dir(&base, ambient_authority()).expect("temp dir should open");
    base_dir.create_dir(&name).expect("temp subdir should be created");
    base.join(name)
}

pub(super) type SeenCommands = Arc<Mutex<Vec<CommandSpec>>>;

/// Runner answering `for-each-ref` from `snapshots` in order and failing
/// any command carrying the `fail_on` argument.
pub(super) fn scripted_runner(
    snapshots: Vec<&'static str>,
    fail_on: Option<(&'static str, CommandOutput)>,
) -> (MockCommandRunner, SeenCommands) {
    let seen: SeenCommands = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let pending = Mutex::new(VecDeque::from(snapshots));
    let mut runner = MockCommandRunner::new();
    runner.expect_run().returning(move |command| {
        recorded
            .lock()
            .expect("command log lock")
            .push(command.clone());
        if let Some((_, output)) = fail_on.as_ref().filter(|(arg, _)| command.has_arg(arg)) {
            return Ok(output.clone());
        }
        if command.has_arg("for-each-ref") {
            let refs = pending
                .lock()
                .expect("snapshot lock")
                .pop_front()
                .unwrap_or_default();
            return Ok(CommandOutput::succeeded(refs));
        }
        Ok(CommandOutput::succeeded(""))
    });
    (runner, seen)
}
