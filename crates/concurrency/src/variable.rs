//! The transactional variable cell (C2).
//!
//! `VarCell<T>` is the engine-internal primitive; the user-facing
//! `Variable<T>` handle (with `read`/`open_for_write`/`set`, transaction-aware
//! error handling, etc.) is layered on top of it in `stm-engine`, which alone
//! has access to the ambient "current transaction" slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use stm_core::{Duplicate, TxnId, VarId};

struct VarState<T> {
    value: T,
    version: u64,
}

struct VarCellInner<T> {
    state: Mutex<VarState<T>>,
    owner: AtomicU64,
}

/// A versioned memory cell holding a committed value plus a short-lived
/// owner pointer used during commit.
///
/// `value` and `version` are read and written together under a single
/// `parking_lot::Mutex`, which trivially gives `read_committed` the
/// consistent-snapshot guarantee the original design asked for (either a
/// sequence lock or "read version, value, version again" would also satisfy
/// it; the mutex is simpler and the critical section is always a plain
/// move, never user code).
pub struct VarCell<T: Duplicate> {
    id: VarId,
    inner: Arc<VarCellInner<T>>,
}

impl<T: Duplicate> Clone for VarCell<T> {
    fn clone(&self) -> Self {
        VarCell {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Duplicate> VarCell<T> {
    /// Allocates a new cell, publishing `initial` directly at version 0.
    pub fn new(initial: T) -> Self {
        VarCell {
            id: VarId::fresh(),
            inner: Arc::new(VarCellInner {
                state: Mutex::new(VarState {
                    value: initial,
                    version: 0,
                }),
                owner: AtomicU64::new(0),
            }),
        }
    }

    /// This cell's stable identity.
    pub fn id(&self) -> VarId {
        self.id
    }

    /// An atomic, consistently-observed snapshot of `(value, version)`.
    pub fn read_committed(&self) -> (T, u64) {
        let guard = self.inner.state.lock();
        (guard.value.duplicate(), guard.version)
    }

    /// The committed version only, without duplicating the value.
    pub fn current_version(&self) -> u64 {
        self.inner.state.lock().version
    }

    /// Atomically sets the owner to `txn` iff currently unowned.
    pub fn try_acquire(&self, txn: TxnId) -> bool {
        self.inner
            .owner
            .compare_exchange(0, txn.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clears the owner iff it is currently `txn`. A no-op otherwise, so a
    /// transaction that never acquired (or already released) this cell can
    /// call it unconditionally during abort cleanup.
    pub fn release(&self, txn: TxnId) {
        let _ = self
            .inner
            .owner
            .compare_exchange(txn.raw(), 0, Ordering::AcqRel, Ordering::Acquire);
    }

    /// True if some transaction currently owns this cell for commit.
    pub fn is_owned(&self) -> bool {
        self.inner.owner.load(Ordering::Acquire) != 0
    }

    /// Stores `new_value`/`new_version`, then releases ownership. Must only
    /// be called while this cell is acquired by `txn`.
    pub fn publish(&self, new_value: T, new_version: u64, txn: TxnId) {
        {
            let mut guard = self.inner.state.lock();
            guard.value = new_value;
            guard.version = new_version;
        }
        self.release(txn);
    }
}
