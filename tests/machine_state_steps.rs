//! Behaviour tests for machine state transitions.

#[path = "machine_state_steps/mod.rs"]
mod machine_state_steps_defs;

use machine_state_steps_defs::world::{MachineWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/machine_states.feature",
    name = "A registered machine starts offline and gets no work"
)]
#[tokio::test(flavor = "multi_thread")]
async fn registered_machine_starts_offline(world: MachineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/machine_states.feature",
    name = "An online machine is handed work"
)]
#[tokio::test(flavor = "multi_thread")]
async fn online_machine_is_handed_work(world: MachineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/machine_states.feature",
    name = "A stopped machine drains before going offline"
)]
#[tokio::test(flavor = "multi_thread")]
async fn stopped_machine_drains(world: MachineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/machine_states.feature",
    name = "A drained machine goes offline"
)]
#[tokio::test(flavor = "multi_thread")]
async fn drained_machine_goes_offline(world: MachineWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/machine_states.feature",
    name = "An offline machine cannot be stopped"
)]
#[tokio::test(flavor = "multi_thread")]
async fn offline_machine_cannot_be_stopped(world: MachineWorld) {
    let _ = world;
}
