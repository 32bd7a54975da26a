//! Ambient two-phase-commit coordinator enlistment (§4.6).
//!
//! When the calling context is already inside an external distributed
//! transaction, an outermost STM transaction's own `commit` does not
//! publish; it performs Phase 1 (lock) and Phase 2 (validate) eagerly, then
//! hands a [`StmParticipant`] to the enlisted [`AmbientCoordinator`], which
//! later calls exactly one of [`StmParticipant::commit`] (Phase 3: publish)
//! or [`StmParticipant::rollback`] (release without publishing).

use std::cell::RefCell;
use std::sync::Arc;

use stm_concurrency::TransactionLog;
use stm_core::TxnId;
use tracing::{debug, info};

use crate::clock;

/// The external two-phase-commit driver an outermost STM transaction
/// enlists with, at most once per ambient scope.
pub trait AmbientCoordinator: Send + Sync {
    /// Registers `participant`. The coordinator must eventually call either
    /// [`StmParticipant::commit`] or [`StmParticipant::rollback`] on it,
    /// exactly once.
    fn enlist(&self, participant: StmParticipant);
}

/// The STM side of the two-phase protocol. By the time a participant is
/// constructed, Phase 1 (lock) and Phase 2 (validate) have already
/// succeeded; only Phase 3 (publish) or a rollback remain.
pub struct StmParticipant {
    pub(crate) id: TxnId,
    pub(crate) log: TransactionLog,
}

impl StmParticipant {
    /// Phase 3: allocates a commit version and publishes every write entry.
    /// An STM transaction cannot be published twice; `self` is consumed so
    /// calling this is a one-shot operation.
    pub fn commit(self) {
        let commit_version = clock::advance();
        for (var, mut entry) in self.log {
            entry.publish(commit_version, self.id);
            debug!(txn = %self.id, %var, version = commit_version, "ambient commit: published");
        }
    }

    /// Releases every acquired entry without publishing; values remain at
    /// their pre-transaction versions.
    pub fn rollback(self) {
        for (var, entry) in self.log {
            entry.release(self.id);
            debug!(txn = %self.id, %var, "ambient rollback: released without publishing");
        }
    }
}

thread_local! {
    static AMBIENT: RefCell<Option<Arc<dyn AmbientCoordinator>>> = RefCell::new(None);
}

/// Enlists `coordinator` as the ambient two-phase-commit driver for
/// transactions subsequently committed on this thread.
pub fn enlist_ambient(coordinator: Arc<dyn AmbientCoordinator>) {
    info!("ambient coordinator enlisted for this thread");
    AMBIENT.with(|a| *a.borrow_mut() = Some(coordinator));
}

/// Clears the ambient coordinator for this thread.
pub fn clear_ambient() {
    AMBIENT.with(|a| *a.borrow_mut() = None);
}

pub(crate) fn current() -> Option<Arc<dyn AmbientCoordinator>> {
    AMBIENT.with(|a| a.borrow().clone())
}
