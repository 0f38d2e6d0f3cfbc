//! When steps for machine state BDD scenarios.

use super::world::{MachineWorld, run_async};
use codeimport::{
    dispatcher::{Dispatcher, DispatcherSettings, ProcessWorkerLauncher},
    jobs::adapters::rpc::LocalSchedulerClient,
};
use eyre::WrapErr;
use mockable::DefaultClock;
use rstest_bdd_macros::when;
use std::sync::Arc;

#[when("the machine asks for a job")]
fn machine_asks_for_job(world: &mut MachineWorld) -> Result<(), eyre::Report> {
    let host = world.hostname()?;
    let claimed = run_async(world.scheduler.get_job_for_machine(&host, 4)).wrap_err("claim")?;
    world.last_claim = Some(claimed);
    Ok(())
}

#[when("the machine is stopped")]
fn machine_is_stopped(world: &mut MachineWorld) -> Result<(), eyre::Report> {
    let host = world.hostname()?;
    world.last_transition = Some(run_async(world.machines.stop(&host, None)));
    Ok(())
}

#[when("the dispatcher runs")]
fn dispatcher_runs(world: &mut MachineWorld) -> Result<(), eyre::Report> {
    let dispatcher = Dispatcher::new(
        Arc::clone(&world.store),
        Arc::new(DefaultClock),
        Arc::new(LocalSchedulerClient::new(Arc::clone(&world.scheduler))),
        ProcessWorkerLauncher::new("import_worker", "/tmp/codeimport-scenarios"),
        DispatcherSettings {
            hostname: world.hostname()?,
            worker_limit: 4,
            max_local_jobs: 4,
        },
    );
    let outcome = run_async(dispatcher.run_cycle()).wrap_err("dispatch cycle")?;
    world.last_dispatch = Some(outcome);
    Ok(())
}
