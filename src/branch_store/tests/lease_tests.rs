//! Lease exclusivity and release tests.

use super::{open, temp_dir};
use crate::branch_store::{LeaseError, LeaseManager, lease::lease_file_name};
use rstest::{fixture, rstest};

#[fixture]
fn manager() -> LeaseManager {
    LeaseManager::open(&temp_dir("leases")).expect("lease dir opens")
}

#[rstest]
fn held_lease_refuses_a_second_holder(manager: LeaseManager) {
    let guard = manager.acquire("alice/widget/trunk").expect("first acquire");

    let second = manager.acquire("alice/widget/trunk");

    assert!(matches!(second, Err(LeaseError::Held(key)) if key == "alice/widget/trunk"));
    assert_eq!(guard.key(), "alice/widget/trunk");
}

#[rstest]
fn dropping_the_guard_releases_the_lease(manager: LeaseManager) {
    let guard = manager.acquire("alice/widget/trunk").expect("first acquire");
    drop(guard);

    let again = manager.acquire("alice/widget/trunk");

    assert!(again.is_ok());
}

#[rstest]
fn lock_file_left_by_a_dead_holder_does_not_block() {
    let root = temp_dir("leases");
    // A holder killed mid-run leaves its file and pid but no lock.
    open(&root)
        .write(lease_file_name("alice/widget/trunk"), "4194304\n")
        .expect("leftover lock file written");
    let manager = LeaseManager::open(&root).expect("lease dir opens");

    let guard = manager.acquire("alice/widget/trunk");

    assert!(guard.is_ok());
}

#[rstest]
fn lock_file_records_the_current_holder() {
    let root = temp_dir("leases");
    let manager = LeaseManager::open(&root).expect("lease dir opens");
    let file_name = lease_file_name("alice/widget/trunk");

    let guard = manager.acquire("alice/widget/trunk").expect("acquire");
    let while_held = open(&root).read_to_string(&file_name).expect("lock file readable");
    drop(guard);
    let after_release = open(&root).read_to_string(&file_name).expect("lock file kept");

    assert_eq!(while_held.trim(), std::process::id().to_string());
    assert!(after_release.is_empty());
}

#[rstest]
fn similar_keys_do_not_collide(manager: LeaseManager) {
    let _first = manager.acquire("a_b/c").expect("first key");

    let second = manager.acquire("a/b_c");

    assert!(second.is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scoped_lease_is_released_after_the_body(manager: LeaseManager) {
    let inside = manager
        .scoped("bob/gadget/trunk", || async {
            manager.acquire("bob/gadget/trunk").is_err()
        })
        .await
        .expect("scoped lease acquired");

    assert!(inside);
    assert!(manager.acquire("bob/gadget/trunk").is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scoped_lease_is_released_when_the_body_fails(manager: LeaseManager) {
    let result: Result<Result<(), &str>, LeaseError> = manager
        .scoped("bob/gadget/trunk", || async { Err("fetch failed") })
        .await;

    assert!(matches!(result, Ok(Err("fetch failed"))));
    assert!(manager.acquire("bob/gadget/trunk").is_ok());
}
