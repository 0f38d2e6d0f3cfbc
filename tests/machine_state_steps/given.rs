//! Given steps for machine state BDD scenarios.

use super::world::{MachineWorld, run_async};
use codeimport::jobs::domain::{
    Hostname, ImportSource, JobResultStatus, NewImport, TargetBranch, VcsKind,
};
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given(r#"a registered machine "{hostname}""#)]
fn registered_machine(world: &mut MachineWorld, hostname: String) -> Result<(), eyre::Report> {
    let host = Hostname::new(hostname)?;
    run_async(world.machines.register(&host)).wrap_err("register machine")?;
    world.hostname = Some(host);
    Ok(())
}

#[given("the machine has been started")]
fn machine_started(world: &mut MachineWorld) -> Result<(), eyre::Report> {
    let host = world.hostname()?;
    run_async(world.machines.start(&host, None)).wrap_err("start machine")?;
    Ok(())
}

#[given("the machine has been stopped")]
fn machine_stopped(world: &mut MachineWorld) -> Result<(), eyre::Report> {
    let host = world.hostname()?;
    run_async(world.machines.stop(&host, Some("maintenance".to_owned())))
        .wrap_err("stop machine")?;
    Ok(())
}

#[given(r#"an approved import into "{target}""#)]
fn approved_import(world: &mut MachineWorld, target: String) -> Result<(), eyre::Report> {
    let source = ImportSource::from_url(VcsKind::Git, format!("https://git.example.org/{target}"))?;
    let import = run_async(
        world
            .workflow
            .create_import(NewImport::new(source, TargetBranch::new(target)?)),
    )
    .wrap_err("create import")?;
    run_async(world.workflow.approve(import.id())).wrap_err("approve import")?;
    Ok(())
}

#[given("the machine has claimed a job")]
fn machine_claimed_job(world: &mut MachineWorld) -> Result<(), eyre::Report> {
    let host = world.hostname()?;
    let claimed = run_async(world.scheduler.get_job_for_machine(&host, 4))
        .wrap_err("claim job")?
        .ok_or_else(|| eyre::eyre!("no job was due for the machine"))?;
    world.claimed_job = Some(claimed);
    Ok(())
}

#[given(r#"the claimed job has finished with "{status}""#)]
fn claimed_job_finished(world: &mut MachineWorld, status: String) -> Result<(), eyre::Report> {
    let job_id = world
        .claimed_job
        .ok_or_else(|| eyre::eyre!("missing claimed job in scenario world"))?;
    let parsed = JobResultStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    run_async(world.scheduler.finish_job(job_id, parsed, None)).wrap_err("finish job")?;
    Ok(())
}
