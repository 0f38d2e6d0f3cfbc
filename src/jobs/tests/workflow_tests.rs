//! Job workflow tests: approval, suspension, run-now and the missing-job
//! scan.

use super::ManualClock;
use crate::jobs::{
    adapters::memory::InMemoryCodeImportStore,
    domain::{
        Hostname, ImportConfiguration, ImportSource, JobResultStatus, NewImport, ReviewStatus,
        TargetBranch, VcsKind,
    },
    ports::{CodeImportStore, CodeImportStoreError},
    services::{
        JobWorkflow, MachineAdminService, RunNowOutcome, ScanOutcome, SchedulerPolicy,
        SchedulerService, WorkflowError,
    },
};
use chrono::TimeDelta;
use mockable::Clock;
use rstest::{fixture, rstest};
use std::sync::Arc;

type TestWorkflow = JobWorkflow<InMemoryCodeImportStore, ManualClock>;

struct Fixture {
    store: Arc<InMemoryCodeImportStore>,
    clock: Arc<ManualClock>,
    workflow: TestWorkflow,
}

#[fixture]
fn world() -> Fixture {
    let store = Arc::new(InMemoryCodeImportStore::new());
    let clock = Arc::new(ManualClock::new());
    Fixture {
        workflow: JobWorkflow::new(Arc::clone(&store), Arc::clone(&clock)),
        store,
        clock,
    }
}

fn bzr_import(target: &str) -> NewImport {
    NewImport::new(
        ImportSource::from_url(VcsKind::Bzr, format!("http://bzr.example.org/{target}"))
            .expect("valid source"),
        TargetBranch::new(target).expect("valid target"),
    )
}

async fn created(world: &Fixture, target: &str) -> ImportConfiguration {
    world
        .workflow
        .create_import(bzr_import(target))
        .await
        .expect("create import")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn new_imports_await_review_without_a_job(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;

    assert_eq!(import.review_status(), ReviewStatus::New);
    let job = world
        .store
        .find_job_for_import(import.id())
        .await
        .expect("lookup");
    assert_eq!(job, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_targets_are_rejected(world: Fixture) {
    created(&world, "alice/widget/trunk").await;

    let result = world
        .workflow
        .create_import(bzr_import("alice/widget/trunk"))
        .await;

    assert!(matches!(
        result,
        Err(WorkflowError::Store(CodeImportStoreError::DuplicateImportTarget(_)))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approval_creates_a_job_due_now(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;

    let job = world.workflow.approve(import.id()).await.expect("approve");

    assert_eq!(job.import_id(), import.id());
    assert_eq!(job.date_due(), world.clock.utc());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn approving_twice_is_an_invalid_transition(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;
    world.workflow.approve(import.id()).await.expect("approve");

    let result = world.workflow.approve(import.id()).await;

    assert!(matches!(result, Err(WorkflowError::Domain(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn request_job_now_leaves_due_jobs_alone(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;
    let job = world.workflow.approve(import.id()).await.expect("approve");
    world.clock.advance(TimeDelta::seconds(5));

    let already_due = world.workflow.request_job_now(import.id()).await;

    assert!(matches!(already_due, Ok(RunNowOutcome::AlreadyDue(id)) if id == job.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn request_job_now_reports_running_jobs(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;
    world.workflow.approve(import.id()).await.expect("approve");
    let machines = MachineAdminService::new(Arc::clone(&world.store), Arc::clone(&world.clock));
    let scheduler = SchedulerService::new(
        Arc::clone(&world.store),
        Arc::clone(&world.clock),
        SchedulerPolicy::new("http://branches.example.org"),
    );
    let host = Hostname::new("importer-1").expect("valid hostname");
    machines.register(&host).await.expect("register");
    machines.start(&host, None).await.expect("start");
    let job_id = scheduler
        .get_job_for_machine(&host, 1)
        .await
        .expect("claim")
        .expect("job is due");
    scheduler
        .finish_job(job_id, JobResultStatus::Success, None)
        .await
        .expect("finish");

    let brought_forward = world.workflow.request_job_now(import.id()).await;
    let next_id = scheduler
        .get_job_for_machine(&host, 1)
        .await
        .expect("claim")
        .expect("job is due after run-now");
    let while_running = world.workflow.request_job_now(import.id()).await;

    assert!(matches!(brought_forward, Ok(RunNowOutcome::BroughtForward(id)) if id == next_id));
    assert!(matches!(while_running, Ok(RunNowOutcome::AlreadyRunning(id)) if id == next_id));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn request_job_now_without_a_job_fails(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;

    let result = world.workflow.request_job_now(import.id()).await;

    assert!(matches!(result, Err(WorkflowError::NoJobForImport(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn suspended_import_keeps_its_job_unclaimable(world: Fixture) {
    let import = created(&world, "alice/widget/trunk").await;
    world.workflow.approve(import.id()).await.expect("approve");
    world.workflow.suspend(import.id()).await.expect("suspend");
    let machines = MachineAdminService::new(Arc::clone(&world.store), Arc::clone(&world.clock));
    let scheduler = SchedulerService::new(
        Arc::clone(&world.store),
        Arc::clone(&world.clock),
        SchedulerPolicy::new("http://branches.example.org"),
    );
    let host = Hostname::new("importer-1").expect("valid hostname");
    machines.register(&host).await.expect("register");
    machines.start(&host, None).await.expect("start");

    let claimed = scheduler.get_job_for_machine(&host, 4).await.expect("claim");

    assert_eq!(claimed, None);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scan_schedules_reviewed_imports_and_skips_the_rest(world: Fixture) {
    let reviewed = created(&world, "alice/widget/trunk").await;
    let pending_review = created(&world, "bob/gadget/trunk").await;
    let mut approved = reviewed.clone();
    approved
        .set_review_status(ReviewStatus::Reviewed, world.clock.utc())
        .expect("review");
    world.store.update_import(&approved).await.expect("update");

    let summary = world
        .workflow
        .schedule_missing_jobs()
        .await
        .expect("scan succeeds");

    assert_eq!(summary.scheduled(), 1);
    assert_eq!(summary.skipped(), 1);
    assert_eq!(summary.failed(), 0);
    assert!(matches!(
        summary.outcomes.as_slice(),
        [
            (first, ScanOutcome::Scheduled(_)),
            (second, ScanOutcome::NotSchedulable(ReviewStatus::New)),
        ] if *first == reviewed.id() && *second == pending_review.id()
    ));
    let job = world
        .store
        .find_job_for_import(reviewed.id())
        .await
        .expect("lookup")
        .expect("job created");
    assert_eq!(job.date_due(), world.clock.utc());

    let rescan = world.workflow.schedule_missing_jobs().await.expect("rescan");
    assert_eq!(rescan.scheduled(), 0);
}
