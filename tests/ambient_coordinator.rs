//! External two-phase-commit coordinator enlistment (§4.6, §8 S7).

use std::sync::Arc;

use stm::{clear_ambient, enlist_ambient, Engine};
use stm::{AmbientCoordinator, StmParticipant};

/// A coordinator that holds the enlisted participant until told to finish,
/// standing in for an external distributed-transaction driver.
struct HoldingCoordinator {
    held: std::sync::Mutex<Option<StmParticipant>>,
}

impl HoldingCoordinator {
    fn new() -> Self {
        HoldingCoordinator {
            held: std::sync::Mutex::new(None),
        }
    }

    fn take(&self) -> StmParticipant {
        self.held.lock().unwrap().take().expect("a participant was enlisted")
    }
}

impl AmbientCoordinator for HoldingCoordinator {
    fn enlist(&self, participant: StmParticipant) {
        *self.held.lock().unwrap() = Some(participant);
    }
}

#[test]
fn stm_commit_defers_publish_and_coordinator_rollback_reverts_it() {
    let engine = Engine::new();
    let a = engine.allocate(1i64).unwrap();
    let b = engine.allocate(2i64).unwrap();

    let coordinator = Arc::new(HoldingCoordinator::new());
    enlist_ambient(coordinator.clone());

    let txn = engine.create();
    a.set(10).unwrap();
    b.set(20).unwrap();
    // Phase 1/2 run here; Phase 3 is handed off instead of running inline.
    txn.commit().unwrap();

    // Not yet published: the coordinator hasn't called commit or rollback.
    assert_eq!(a.read_without_opening().0, 1);
    assert_eq!(b.read_without_opening().0, 2);

    coordinator.take().rollback();
    clear_ambient();

    assert_eq!(a.read_without_opening().0, 1);
    assert_eq!(b.read_without_opening().0, 2);
}

#[test]
fn stm_commit_deferred_then_coordinator_commit_publishes_it() {
    let engine = Engine::new();
    let a = engine.allocate(1i64).unwrap();

    let coordinator = Arc::new(HoldingCoordinator::new());
    enlist_ambient(coordinator.clone());

    let txn = engine.create();
    a.set(42).unwrap();
    txn.commit().unwrap();

    assert_eq!(a.read_without_opening().0, 1);

    coordinator.take().commit();
    clear_ambient();

    assert_eq!(a.read_without_opening().0, 42);
}
