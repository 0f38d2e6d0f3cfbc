//! End-to-end worker runs against mocked scheduler and VCS tools and a
//! real branch store on temporary directories.

use super::{scripted_runner, temp_dir};
use crate::branch_store::{FilesystemBranchStore, IMPORT_MARKER, LeaseManager};
use crate::jobs::{
    domain::{
        ImportSource, ImportSourceDetails, JobId, JobResultStatus, LogArtifactId, TargetBranch,
        VcsKind,
    },
    ports::{ImportData, MockSchedulerClient, SchedulerRpcError},
};
use crate::worker::{
    ArtifactError, CommandOutput, CommandRunner, CommandSpec, ImportWorker, LogArtifactStore,
    StoredArtifact, WorkerCollaborators, WorkerError, WorkerOutcome, WorkerSettings,
    command::MockCommandRunner, report_setup_failure,
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use rstest::{fixture, rstest};
use std::{
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

const BASE_URL: &str = "http://branches.example.org";
const JOB: i64 = 7;
const QUIET: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct RecordingArtifacts {
    names: Mutex<Vec<String>>,
}

#[async_trait]
impl LogArtifactStore for RecordingArtifacts {
    async fn upload(&self, name: &str, _contents: Vec<u8>) -> Result<StoredArtifact, ArtifactError> {
        self.names
            .lock()
            .expect("artifact lock")
            .push(name.to_owned());
        Ok(StoredArtifact {
            id: LogArtifactId::new(70).expect("valid id"),
            sha256: String::new(),
        })
    }
}

/// Runner whose fetch never finishes within a test.
struct StallingRunner;

#[async_trait]
impl CommandRunner for StallingRunner {
    async fn run(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        if command.has_arg("fetch") {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(CommandOutput::succeeded(""))
    }
}

struct Rig {
    branches_root: Utf8PathBuf,
    leases: Arc<LeaseManager>,
    scratch_root: Utf8PathBuf,
    log_file: Utf8PathBuf,
    artifacts: Arc<RecordingArtifacts>,
}

impl Rig {
    fn worker<R: CommandRunner>(
        &self,
        scheduler: MockSchedulerClient,
        runner: R,
        heartbeat_interval: Duration,
    ) -> ImportWorker<MockSchedulerClient, FilesystemBranchStore, R, RecordingArtifacts> {
        let collaborators = WorkerCollaborators {
            scheduler: Arc::new(scheduler),
            branches: Arc::new(
                FilesystemBranchStore::open(&self.branches_root).expect("branch store opens"),
            ),
            runner: Arc::new(runner),
            artifacts: Arc::clone(&self.artifacts),
            leases: Arc::clone(&self.leases),
        };
        ImportWorker::new(
            collaborators,
            WorkerSettings {
                job_id: job_id(),
                log_file: self.log_file.clone(),
                scratch_root: self.scratch_root.clone(),
                branch_base_url: BASE_URL.to_owned(),
                heartbeat_interval,
            },
        )
    }

    fn remote_mirror(&self) -> Utf8PathBuf {
        self.branches_root.join("alice/widget/trunk")
    }

    fn uploaded(&self) -> Vec<String> {
        self.artifacts.names.lock().expect("artifact lock").clone()
    }
}

#[fixture]
fn rig() -> Rig {
    let logs = temp_dir("worker_logs");
    let log_file = logs.join("worker.log");
    Dir::open_ambient_dir(&logs, ambient_authority())
        .expect("log dir opens")
        .write("worker.log", "starting import\n")
        .expect("log written");
    Rig {
        branches_root: temp_dir("branches"),
        leases: Arc::new(LeaseManager::open(&temp_dir("leases")).expect("leases open")),
        scratch_root: temp_dir("scratch"),
        log_file,
        artifacts: Arc::new(RecordingArtifacts::default()),
    }
}

fn job_id() -> JobId {
    JobId::new(JOB).expect("valid job id")
}

fn import_data() -> ImportData {
    let details = ImportSourceDetails::new(
        TargetBranch::new("alice/widget/trunk").expect("valid target"),
        ImportSource::from_url(VcsKind::Git, "https://git.example.org/widget.git")
            .expect("valid source"),
    );
    ImportData {
        arguments: details.to_arguments(),
        branch_url: format!("{BASE_URL}/alice/widget/trunk"),
        log_file_name: "alice-widget-trunk.log".to_owned(),
    }
}

fn scheduler_expecting(data: ImportData, expected: JobResultStatus) -> MockSchedulerClient {
    let mut scheduler = MockSchedulerClient::new();
    scheduler
        .expect_get_import_data_for_job_id()
        .returning(move |_| Ok(data.clone()));
    scheduler.expect_update_heartbeat().returning(|_, _| Ok(()));
    scheduler
        .expect_finish_job()
        .withf(move |job, status, artifact| {
            job.value() == JOB && *status == expected && artifact.is_some()
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    scheduler
}

fn idle_runner() -> MockCommandRunner {
    let mut runner = MockCommandRunner::new();
    runner.expect_run().times(0);
    runner
}

fn is_empty_dir(path: &Utf8Path) -> bool {
    Dir::open_ambient_dir(path, ambient_authority())
        .expect("directory opens")
        .entries()
        .expect("directory lists")
        .next()
        .is_none()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn new_history_is_pushed_and_reported(rig: Rig) {
    let scheduler = scheduler_expecting(import_data(), JobResultStatus::Success);
    let (runner, _seen) = scripted_runner(vec!["", "abc refs/heads/main"], None);

    let outcome = rig.worker(scheduler, runner, QUIET).run().await.expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::Success));
    assert_eq!(outcome.exit_code(), 0);
    assert!(rig.remote_mirror().join(IMPORT_MARKER).is_file());
    assert_eq!(rig.uploaded(), vec!["alice-widget-trunk.log".to_owned()]);
    assert!(rig.leases.acquire("alice/widget/trunk").is_ok());
    assert!(is_empty_dir(&rig.scratch_root));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unchanged_history_is_not_pushed(rig: Rig) {
    let scheduler = scheduler_expecting(import_data(), JobResultStatus::SuccessNoChange);
    let (runner, _seen) = scripted_runner(vec!["", ""], None);

    let outcome = rig.worker(scheduler, runner, QUIET).run().await.expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::SuccessNoChange));
    assert_eq!(outcome.exit_code(), 2);
    assert!(!rig.remote_mirror().exists());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn fetch_failures_are_reported_with_their_status(rig: Rig) {
    let scheduler = scheduler_expecting(import_data(), JobResultStatus::FailureForbidden);
    let failure = CommandOutput::failed(128, "fatal: Authentication failed for 'https://git.example.org'");
    let (runner, _seen) = scripted_runner(vec!["", ""], Some(("fetch", failure)));

    let outcome = rig.worker(scheduler, runner, QUIET).run().await.expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::FailureForbidden));
    assert!(!rig.remote_mirror().exists());
    assert!(rig.leases.acquire("alice/widget/trunk").is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn malformed_arguments_fail_without_running_tools(rig: Rig) {
    let data = ImportData {
        arguments: vec!["alice/widget/trunk".to_owned()],
        ..import_data()
    };
    let scheduler = scheduler_expecting(data, JobResultStatus::Failure);

    let outcome = rig
        .worker(scheduler, idle_runner(), QUIET)
        .run()
        .await
        .expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::Failure));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn branch_url_naming_another_target_fails(rig: Rig) {
    let data = ImportData {
        branch_url: format!("{BASE_URL}/bob/widget/trunk"),
        ..import_data()
    };
    let scheduler = scheduler_expecting(data, JobResultStatus::Failure);

    let outcome = rig
        .worker(scheduler, idle_runner(), QUIET)
        .run()
        .await
        .expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::Failure));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn hand_authored_branches_are_left_alone(rig: Rig) {
    let branches = Dir::open_ambient_dir(&rig.branches_root, ambient_authority())
        .expect("branches open");
    branches
        .create_dir_all("alice/widget/trunk")
        .expect("branch dir created");
    branches
        .write("alice/widget/trunk/README", "hand written\n")
        .expect("file written");
    let scheduler = scheduler_expecting(import_data(), JobResultStatus::FailureInvalid);

    let outcome = rig
        .worker(scheduler, idle_runner(), QUIET)
        .run()
        .await
        .expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::FailureInvalid));
    assert!(rig.remote_mirror().join("README").is_file());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn held_lease_fails_the_run(rig: Rig) {
    let _held = rig.leases.acquire("alice/widget/trunk").expect("lease free");
    let scheduler = scheduler_expecting(import_data(), JobResultStatus::Failure);

    let outcome = rig
        .worker(scheduler, idle_runner(), QUIET)
        .run()
        .await
        .expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Finished(JobResultStatus::Failure));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn vanished_job_is_abandoned_without_a_report(rig: Rig) {
    let mut scheduler = MockSchedulerClient::new();
    scheduler
        .expect_get_import_data_for_job_id()
        .returning(|_| Err(SchedulerRpcError::NoSuchJob(JOB)));
    scheduler.expect_finish_job().times(0);

    let outcome = rig
        .worker(scheduler, idle_runner(), QUIET)
        .run()
        .await
        .expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Abandoned);
    assert_eq!(outcome.exit_code(), 1);
    assert!(rig.uploaded().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reclaimed_job_stops_the_import(rig: Rig) {
    let mut scheduler = MockSchedulerClient::new();
    scheduler
        .expect_get_import_data_for_job_id()
        .returning(|_| Ok(import_data()));
    scheduler
        .expect_update_heartbeat()
        .returning(|_, _| Err(SchedulerRpcError::NoSuchJob(JOB)));
    scheduler.expect_finish_job().times(0);

    let outcome = rig
        .worker(scheduler, StallingRunner, Duration::from_millis(20))
        .run()
        .await
        .expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Abandoned);
    assert!(rig.leases.acquire("alice/widget/trunk").is_ok());
    assert!(rig.uploaded().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn result_for_a_reclaimed_job_is_dropped(rig: Rig) {
    let mut scheduler = MockSchedulerClient::new();
    scheduler
        .expect_get_import_data_for_job_id()
        .returning(|_| Ok(import_data()));
    scheduler
        .expect_finish_job()
        .times(1)
        .returning(|_, _, _| Err(SchedulerRpcError::NoSuchJob(JOB)));
    let (runner, _seen) = scripted_runner(vec!["", ""], None);

    let outcome = rig.worker(scheduler, runner, QUIET).run().await.expect("worker runs");

    assert_eq!(outcome, WorkerOutcome::Abandoned);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_scheduler_is_an_error(rig: Rig) {
    let mut scheduler = MockSchedulerClient::new();
    scheduler
        .expect_get_import_data_for_job_id()
        .returning(|_| Err(SchedulerRpcError::transport(io::Error::from(io::ErrorKind::ConnectionRefused))));

    let err = rig
        .worker(scheduler, idle_runner(), QUIET)
        .run()
        .await
        .expect_err("worker cannot start");

    assert!(matches!(err, WorkerError::Scheduler(SchedulerRpcError::Transport(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn setup_failure_is_reported_as_a_failed_job() {
    let mut scheduler = MockSchedulerClient::new();
    scheduler.expect_get_import_data_for_job_id().times(0);
    scheduler
        .expect_finish_job()
        .withf(|job, status, artifact| {
            job.value() == JOB && *status == JobResultStatus::Failure && artifact.is_none()
        })
        .times(1)
        .returning(|_, _, _| Ok(()));
    let job_id = JobId::new(JOB).expect("valid job id");

    let err = report_setup_failure(&scheduler, job_id, "lease dir is not writable").await;

    assert_eq!(err, "lease dir is not writable");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn setup_failure_survives_an_unreachable_scheduler() {
    let mut scheduler = MockSchedulerClient::new();
    scheduler.expect_finish_job().times(1).returning(|_, _, _| {
        Err(SchedulerRpcError::transport(io::Error::from(
            io::ErrorKind::ConnectionRefused,
        )))
    });
    let job_id = JobId::new(JOB).expect("valid job id");

    let err = report_setup_failure(&scheduler, job_id, "branch store missing").await;

    assert_eq!(err, "branch store missing");
}
