//! Then steps for machine state BDD scenarios.

use super::world::{MachineWorld, run_async};
use codeimport::{
    dispatcher::DispatchOutcome,
    jobs::{
        domain::{JobDomainError, MachineState},
        ports::CodeImportStore,
        services::MachineAdminError,
    },
};
use rstest_bdd_macros::then;

#[then(r#"the machine state is "{state}""#)]
fn machine_state_is(world: &MachineWorld, state: String) -> Result<(), eyre::Report> {
    let expected = MachineState::try_from(state.as_str())
        .map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))?;
    let host = world.hostname()?;
    let machine = run_async(world.store.find_machine_by_hostname(&host))?
        .ok_or_else(|| eyre::eyre!("machine {host} is not registered"))?;

    if machine.state() != expected {
        return Err(eyre::eyre!(
            "expected state {}, found {}",
            expected.as_str(),
            machine.state().as_str()
        ));
    }
    Ok(())
}

#[then("no job is handed out")]
fn no_job_handed_out(world: &MachineWorld) -> Result<(), eyre::Report> {
    match world.last_claim {
        Some(None) => Ok(()),
        other => Err(eyre::eyre!("expected no job, got {other:?}")),
    }
}

#[then("a job is handed out")]
fn job_handed_out(world: &MachineWorld) -> Result<(), eyre::Report> {
    match world.last_claim {
        Some(Some(_)) => Ok(()),
        other => Err(eyre::eyre!("expected a job, got {other:?}")),
    }
}

#[then("the machine gets no new work")]
fn machine_gets_no_new_work(world: &MachineWorld) -> Result<(), eyre::Report> {
    let host = world.hostname()?;
    let claimed = run_async(world.scheduler.get_job_for_machine(&host, 4))?;
    if claimed.is_some() {
        return Err(eyre::eyre!("quiescing machine was handed {claimed:?}"));
    }
    Ok(())
}

#[then("the transition is refused")]
fn transition_refused(world: &MachineWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_transition
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing transition result"))?;

    if !matches!(
        result,
        Err(MachineAdminError::Domain(JobDomainError::InvalidMachineTransition { .. }))
    ) {
        return Err(eyre::eyre!("expected an invalid transition error, got {result:?}"));
    }
    Ok(())
}

#[then("the dispatcher reports {running:usize} running job still draining")]
fn dispatcher_reports_draining(world: &MachineWorld, running: usize) -> Result<(), eyre::Report> {
    match world.last_dispatch {
        Some(DispatchOutcome::Draining { running: actual }) if actual == running => Ok(()),
        ref other => Err(eyre::eyre!(
            "expected draining with {running} running jobs, got {other:?}"
        )),
    }
}

#[then("the dispatcher took the machine offline")]
fn dispatcher_took_machine_offline(world: &MachineWorld) -> Result<(), eyre::Report> {
    match world.last_dispatch {
        Some(DispatchOutcome::WentOffline) => Ok(()),
        ref other => Err(eyre::eyre!("expected the machine to go offline, got {other:?}")),
    }
}
