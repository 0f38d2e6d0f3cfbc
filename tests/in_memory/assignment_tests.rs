//! Concurrent job assignment over the in-memory store.

use super::helpers::{Site, site};
use codeimport::jobs::domain::{Hostname, JobId};
use rstest::rstest;
use std::{collections::HashSet, sync::Arc};

async fn claim_concurrently(
    site: &Site,
    hosts: &[Hostname],
    attempts: usize,
    worker_limit: usize,
) -> Result<Vec<JobId>, eyre::Report> {
    let mut tasks = Vec::with_capacity(attempts);
    for attempt in 0..attempts {
        let scheduler = Arc::clone(&site.scheduler);
        let host = hosts
            .get(attempt % hosts.len())
            .cloned()
            .ok_or_else(|| eyre::eyre!("no hosts given"))?;
        tasks.push(tokio::spawn(async move {
            scheduler.get_job_for_machine(&host, worker_limit).await
        }));
    }
    let mut claimed = Vec::new();
    for task in tasks {
        if let Some(job_id) = task.await?? {
            claimed.push(job_id);
        }
    }
    Ok(claimed)
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_job_is_handed_out_twice(site: Site) -> Result<(), eyre::Report> {
    let hosts = vec![
        site.online_machine("importer-1").await?,
        site.online_machine("importer-2").await?,
    ];
    let mut expected = HashSet::new();
    for index in 0..8 {
        let (_, job_id) = site.approved_import(&format!("team/project{index}/trunk")).await?;
        expected.insert(job_id);
    }

    let claimed = claim_concurrently(&site, &hosts, 24, 100).await?;

    let unique: HashSet<JobId> = claimed.iter().copied().collect();
    eyre::ensure!(unique.len() == claimed.len(), "a job was claimed twice: {claimed:?}");
    eyre::ensure!(unique == expected, "claimed {unique:?}, expected {expected:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_limit_holds_under_concurrent_claims(site: Site) -> Result<(), eyre::Report> {
    let hosts = vec![site.online_machine("importer-1").await?];
    for index in 0..10 {
        site.approved_import(&format!("team/project{index}/trunk")).await?;
    }

    let claimed = claim_concurrently(&site, &hosts, 10, 3).await?;

    eyre::ensure!(claimed.len() == 3, "expected 3 claims, got {}", claimed.len());
    Ok(())
}
