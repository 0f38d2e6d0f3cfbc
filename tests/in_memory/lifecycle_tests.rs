//! A job from approval through finish and rescheduling.

use super::helpers::{Site, site};
use codeimport::jobs::{
    domain::{
        CodeImportEventKind, ImportSource, JobResultStatus, JobState, LogArtifactId, NewImport,
        ReviewStatus, TargetBranch,
    },
    ports::CodeImportStore,
    services::SchedulerError,
};
use rstest::rstest;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn finished_job_is_recorded_and_rescheduled(site: Site) -> Result<(), eyre::Report> {
    let host = site.online_machine("importer-1").await?;
    let (import_id, job_id) = site.approved_import("alice/widget/trunk").await?;

    let claimed = site.scheduler.get_job_for_machine(&host, 4).await?;
    eyre::ensure!(claimed == Some(job_id), "expected {job_id} to be claimed, got {claimed:?}");

    let data = site.scheduler.get_import_data_for_job_id(job_id).await?;
    eyre::ensure!(
        data.branch_url == "http://branches.example.org/alice/widget/trunk",
        "unexpected branch URL {}",
        data.branch_url
    );
    site.scheduler
        .update_heartbeat(job_id, "fetched 12 revisions")
        .await?;
    let artifact = LogArtifactId::new(9)?;
    site.scheduler
        .finish_job(job_id, JobResultStatus::Success, Some(artifact))
        .await?;

    let results = site.store.list_results(import_id).await?;
    let result = results
        .first()
        .ok_or_else(|| eyre::eyre!("no result recorded"))?;
    eyre::ensure!(result.status == JobResultStatus::Success, "status {}", result.status);
    eyre::ensure!(result.log_tail.as_str() == "fetched 12 revisions", "tail not kept");
    eyre::ensure!(result.log_artifact == Some(artifact), "artifact not kept");

    let next = site
        .store
        .find_job_for_import(import_id)
        .await?
        .ok_or_else(|| eyre::eyre!("import was not rescheduled"))?;
    eyre::ensure!(next.state() == JobState::Pending, "next job is {}", next.state());
    eyre::ensure!(next.machine_id().is_none(), "next job is still assigned");
    eyre::ensure!(next.date_due() > result.date_finished, "next job is due immediately");

    let import = site
        .store
        .find_import(import_id)
        .await?
        .ok_or_else(|| eyre::eyre!("import vanished"))?;
    eyre::ensure!(import.review_status() == ReviewStatus::Reviewed, "import left review");
    eyre::ensure!(import.date_last_successful().is_some(), "success not recorded");

    let kinds: Vec<CodeImportEventKind> = site
        .store
        .list_events()
        .await?
        .into_iter()
        .map(|event| event.kind)
        .collect();
    eyre::ensure!(
        kinds.ends_with(&[CodeImportEventKind::JobStart, CodeImportEventKind::JobFinish]),
        "unexpected events {kinds:?}"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn finished_job_cannot_be_reported_again(site: Site) -> Result<(), eyre::Report> {
    let host = site.online_machine("importer-1").await?;
    let (_, job_id) = site.approved_import("alice/widget/trunk").await?;
    site.scheduler.get_job_for_machine(&host, 4).await?;
    site.scheduler
        .finish_job(job_id, JobResultStatus::SuccessNoChange, None)
        .await?;

    let again = site
        .scheduler
        .finish_job(job_id, JobResultStatus::Success, None)
        .await;
    let heartbeat = site.scheduler.update_heartbeat(job_id, "late").await;

    eyre::ensure!(matches!(again, Err(SchedulerError::NoSuchJob(_))), "got {again:?}");
    eyre::ensure!(matches!(heartbeat, Err(SchedulerError::NoSuchJob(_))), "got {heartbeat:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scan_skips_unreviewed_imports_and_imports_with_jobs(
    site: Site,
) -> Result<(), eyre::Report> {
    site.approved_import("alice/widget/trunk").await?;
    site.workflow
        .create_import(NewImport::new(
            ImportSource::cvs(":pserver:anon@cvs.example.org:/cvsroot", "gadget")?,
            TargetBranch::new("bob/gadget/trunk")?,
        ))
        .await?;

    let summary = site.workflow.schedule_missing_jobs().await?;

    eyre::ensure!(summary.scheduled() == 0, "scheduled {summary:?}");
    eyre::ensure!(summary.skipped() == 1, "expected the new import skipped: {summary:?}");
    eyre::ensure!(summary.failed() == 0, "scan failed: {summary:?}");
    Ok(())
}
