//! Fetch planning, failure classification and ref change detection.

use super::scripted_runner;
use crate::branch_store::{BranchStoreError, ImportBranchRef, LeaseError};
use crate::jobs::domain::{ImportSource, JobDomainError, JobResultStatus, TargetBranch, VcsKind};
use crate::worker::{
    CommandOutput, CommandSpec, FetchError, FetchOutcome, Fetcher, ImportFailure, shell_escape,
    strategy_for, command::MockCommandRunner,
};
use camino::Utf8Path;
use rstest::rstest;
use std::{io, sync::Arc};

fn mirror() -> &'static Utf8Path {
    Utf8Path::new("/scratch/7/mirror.git")
}

fn git_source() -> ImportSource {
    ImportSource::from_url(VcsKind::Git, "https://git.example.org/widget.git")
        .expect("valid source")
}

#[rstest]
#[case("fatal: Authentication failed for 'https://x'", JobResultStatus::FailureForbidden)]
#[case("svn: E170001: Authorization failed", JobResultStatus::FailureForbidden)]
#[case("fatal: unable to access 'https://x': Could not resolve host: x", JobResultStatus::FailureRemoteBroken)]
#[case("error: RPC failed; early EOF", JobResultStatus::FailureRemoteBroken)]
#[case("ERROR: Repository not found.", JobResultStatus::FailureInvalid)]
#[case("fatal: 'x' does not appear to be a git repository", JobResultStatus::FailureInvalid)]
#[case("svn: E200007: externals are not supported", JobResultStatus::FailureUnsupportedFeature)]
#[case(" ! [rejected] main -> main (non-fast-forward)", JobResultStatus::Failure)]
#[case("segmentation fault", JobResultStatus::Failure)]
fn failures_are_classified_from_stderr(#[case] stderr: &str, #[case] expected: JobResultStatus) {
    let command = CommandSpec::new("git").arg("fetch");
    let failure = FetchError::classify(&command, &CommandOutput::failed(128, stderr));

    assert_eq!(failure.status(), expected);
}

#[rstest]
fn rejected_fetch_is_reported_as_divergence() {
    let command = CommandSpec::new("git").arg("fetch");
    let output = CommandOutput::failed(1, " ! [rejected]        main -> main  (non-fast-forward)\n");

    assert!(matches!(
        FetchError::classify(&command, &output),
        FetchError::Diverged(_)
    ));
}

#[rstest]
fn classified_message_names_command_and_last_line() {
    let command = CommandSpec::new("git").arg("svn").arg("fetch");
    let output = CommandOutput::failed(2, "first line\n\nconnection refused\n");

    let failure = FetchError::classify(&command, &output);

    assert_eq!(
        failure.to_string(),
        "remote broken: git svn fetch (exit 2): connection refused"
    );
}

#[rstest]
fn git_plan_fetches_heads_without_forcing() {
    let commands = strategy_for(&git_source()).plan(mirror(), true);

    assert_eq!(commands.len(), 1);
    let fetch = commands.first().expect("one command");
    assert_eq!(
        fetch.args,
        vec![
            "--git-dir=/scratch/7/mirror.git",
            "fetch",
            "--no-tags",
            "--prune",
            "https://git.example.org/widget.git",
            "refs/heads/*:refs/heads/*",
        ]
    );
}

#[rstest]
#[case(true, 2)]
#[case(false, 1)]
fn svn_plan_initialises_only_fresh_mirrors(#[case] fresh: bool, #[case] expected: usize) {
    let source = ImportSource::from_url(VcsKind::Svn, "svn://svn.example.org/widget/trunk")
        .expect("valid source");

    let commands = strategy_for(&source).plan(mirror(), fresh);

    assert_eq!(commands.len(), expected);
    assert_eq!(commands.first().expect("init").has_arg("init"), fresh);
    assert!(commands.last().expect("fetch").has_arg("fetch"));
}

#[rstest]
fn cvs_plan_imports_the_module_into_the_mirror() {
    let source =
        ImportSource::cvs(":pserver:anon@cvs.example.org:/cvsroot", "widget").expect("valid");

    let commands = strategy_for(&source).plan(mirror(), false);

    let import = commands.first().expect("one command");
    assert!(import.has_arg("cvsimport"));
    assert!(import.has_arg(":pserver:anon@cvs.example.org:/cvsroot"));
    assert_eq!(import.args.last().map(String::as_str), Some("widget"));
}

#[rstest]
fn bzr_plan_goes_through_the_remote_helper() {
    let source = ImportSource::from_url(VcsKind::Bzr, "lp:widget").expect("valid source");

    let commands = strategy_for(&source).plan(mirror(), false);

    assert!(commands.first().expect("fetch").has_arg("bzr::lp:widget"));
}

#[rstest]
#[case("plain-value_1.0", "plain-value_1.0")]
#[case("", "''")]
#[case("two words", "'two words'")]
#[case("it's", "'it'\\''s'")]
#[case("refs/heads/*:refs/heads/*", "'refs/heads/*:refs/heads/*'")]
fn shell_escape_quotes_only_when_needed(#[case] value: &str, #[case] expected: &str) {
    assert_eq!(shell_escape(value), expected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fresh_mirror_is_initialised_before_fetching() {
    let (runner, seen) = scripted_runner(vec!["", "abc refs/heads/main"], None);
    let fetcher = Fetcher::new(Arc::new(runner));

    let outcome = fetcher
        .fetch(strategy_for(&git_source()).as_ref(), mirror(), true)
        .await
        .expect("fetch succeeds");

    assert_eq!(outcome, FetchOutcome::Changed);
    let commands = seen.lock().expect("command log lock");
    assert_eq!(commands.len(), 4);
    let init = commands.first().expect("init ran");
    assert!(init.has_arg("init") && init.has_arg("--bare"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn identical_refs_mean_no_change() {
    let refs = "abc refs/heads/main";
    let (runner, seen) = scripted_runner(vec![refs, refs], None);
    let fetcher = Fetcher::new(Arc::new(runner));

    let outcome = fetcher
        .fetch(strategy_for(&git_source()).as_ref(), mirror(), false)
        .await
        .expect("fetch succeeds");

    assert_eq!(outcome, FetchOutcome::Unchanged);
    assert_eq!(seen.lock().expect("command log lock").len(), 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_fetch_stops_the_plan() {
    let failure = CommandOutput::failed(128, "fatal: Authentication failed");
    let (runner, _seen) = scripted_runner(vec!["", ""], Some(("fetch", failure)));
    let fetcher = Fetcher::new(Arc::new(runner));

    let err = fetcher
        .fetch(strategy_for(&git_source()).as_ref(), mirror(), false)
        .await
        .expect_err("fetch fails");

    assert!(matches!(err, FetchError::Forbidden(_)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_tool_is_a_plain_failure() {
    let mut runner = MockCommandRunner::new();
    runner
        .expect_run()
        .returning(|_| Err(io::Error::from(io::ErrorKind::NotFound)));
    let fetcher = Fetcher::new(Arc::new(runner));

    let err = fetcher
        .fetch(strategy_for(&git_source()).as_ref(), mirror(), false)
        .await
        .expect_err("spawn fails");

    assert!(matches!(&err, FetchError::Spawn { program, .. } if program == "git"));
    assert_eq!(err.status(), JobResultStatus::Failure);
}

fn branch() -> ImportBranchRef {
    ImportBranchRef::from_target(TargetBranch::new("alice/widget/trunk").expect("valid target"))
}

#[rstest]
#[case(ImportFailure::Branch(BranchStoreError::NotImportManaged(branch())), JobResultStatus::FailureInvalid)]
#[case(ImportFailure::Branch(BranchStoreError::InvalidBranchPath("x".to_owned())), JobResultStatus::Failure)]
#[case(ImportFailure::Lease(LeaseError::Held("alice/widget/trunk".to_owned())), JobResultStatus::Failure)]
#[case(ImportFailure::Arguments(JobDomainError::InvalidWorkerArguments("x".to_owned())), JobResultStatus::Failure)]
#[case(ImportFailure::Fetch(FetchError::RemoteBroken("x".to_owned())), JobResultStatus::FailureRemoteBroken)]
fn import_failures_map_to_statuses(#[case] failure: ImportFailure, #[case] expected: JobResultStatus) {
    assert_eq!(failure.status(), expected);
}
