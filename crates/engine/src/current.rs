//! The thread-local "current transaction" stack (§3, §4.3, §4.4, §4.6).
//!
//! Transactions form a single ancestor chain per operating-system thread;
//! only the innermost is ever `current`. This module is the only place
//! that touches the stack directly — [`crate::engine::Variable`] and
//! [`crate::transaction::Transaction`] both go through it.

use std::cell::RefCell;

use stm_concurrency::{validate_log, ErasedEntry, Mode, TransactionLog, TypedEntry, VarCell};
use stm_core::{Duplicate, Error, Result, TxnId, VarId};
use tracing::{debug, info, trace, warn};

use crate::clock;
use crate::coordinator::{self, StmParticipant};
use crate::transaction::Transaction;

pub(crate) struct Inner {
    pub id: TxnId,
    pub log: TransactionLog,
    pub read_version: u64,
}

thread_local! {
    static STACK: RefCell<Vec<Inner>> = RefCell::new(Vec::new());
}

/// Begins a new innermost transaction on this thread (nested if one
/// already exists).
pub(crate) fn begin() -> Transaction {
    let id = TxnId::fresh();
    let read_version = clock::current();
    STACK.with(|s| {
        s.borrow_mut().push(Inner {
            id,
            log: TransactionLog::new(),
            read_version,
        });
    });
    trace!(txn = %id, read_version, "began transaction");
    Transaction::new(id)
}

/// Depth of the ancestor chain on this thread; 0 means no active
/// transaction.
pub fn depth() -> usize {
    STACK.with(|s| s.borrow().len())
}

fn seed_for_write<T: Duplicate>(stack: &mut [Inner], cell: &VarCell<T>) -> Result<(T, u64)> {
    let id = cell.id();
    let depth = stack.len();
    for frame in stack[..depth - 1].iter().rev() {
        if let Some(entry) = frame.log.get(id) {
            let typed = entry
                .as_any()
                .downcast_ref::<TypedEntry<T>>()
                .expect("VarId reused across incompatible value types");
            return Ok((typed.current_value(), entry.snapshot_version()));
        }
    }
    let (value, version) = cell.read_committed();
    if version > stack[depth - 1].read_version {
        return Err(Error::Conflict);
    }
    Ok((value, version))
}

/// `Read(V)` (§4.3).
pub(crate) fn open_for_read<T: Duplicate>(cell: &VarCell<T>) -> Result<T> {
    STACK.with(|s| {
        let stack = s.borrow();
        if stack.is_empty() {
            return Err(Error::NotInTransaction);
        }
        let id = cell.id();
        for frame in stack.iter().rev() {
            if let Some(entry) = frame.log.get(id) {
                let typed = entry
                    .as_any()
                    .downcast_ref::<TypedEntry<T>>()
                    .expect("VarId reused across incompatible value types");
                return Ok(typed.current_value());
            }
        }
        drop(stack);

        let mut stack = s.borrow_mut();
        let depth = stack.len();
        let (value, version) = cell.read_committed();
        if version > stack[depth - 1].read_version {
            return Err(Error::Conflict);
        }
        let dup = value.duplicate();
        let entry = TypedEntry::new_read(cell.clone(), value, version);
        stack[depth - 1].log.insert(id, Box::new(entry));
        Ok(dup)
    })
}

/// `OpenForWrite(V)` (§4.3).
pub(crate) fn open_for_write<T: Duplicate>(cell: &VarCell<T>) -> Result<T> {
    STACK.with(|s| {
        let mut stack = s.borrow_mut();
        if stack.is_empty() {
            return Err(Error::NotInTransaction);
        }
        let depth = stack.len();
        let id = cell.id();
        if let Some(entry) = stack[depth - 1].log.get_mut(id) {
            entry.upgrade_to_write();
            let typed = entry
                .as_any()
                .downcast_ref::<TypedEntry<T>>()
                .expect("VarId reused across incompatible value types");
            return Ok(typed.current_value());
        }
        let (original, snapshot_version) = seed_for_write(&mut stack, cell)?;
        let working = original.duplicate();
        let to_return = original.duplicate();
        let entry = TypedEntry::new_write(cell.clone(), original, snapshot_version, working);
        stack[depth - 1].log.insert(id, Box::new(entry));
        Ok(to_return)
    })
}

/// `Set(V, new_value)` (§4.3).
pub(crate) fn set<T: Duplicate>(cell: &VarCell<T>, new_value: T) -> Result<()> {
    STACK.with(|s| {
        let mut stack = s.borrow_mut();
        if stack.is_empty() {
            return Err(Error::NotInTransaction);
        }
        let depth = stack.len();
        let id = cell.id();
        if let Some(entry) = stack[depth - 1].log.get_mut(id) {
            let typed = entry
                .as_any_mut()
                .downcast_mut::<TypedEntry<T>>()
                .expect("VarId reused across incompatible value types");
            typed.set_working(new_value);
            return Ok(());
        }
        let (original, snapshot_version) = seed_for_write(&mut stack, cell)?;
        let entry = TypedEntry::new_write(cell.clone(), original, snapshot_version, new_value);
        stack[depth - 1].log.insert(id, Box::new(entry));
        Ok(())
    })
}

/// Drops the best-effort `Release` hint for `id` from the innermost
/// transaction, if it is still in Read mode.
pub(crate) fn release_hint(id: VarId) {
    STACK.with(|s| {
        let mut stack = s.borrow_mut();
        if let Some(top) = stack.last_mut() {
            if let Some(entry) = top.log.get(id) {
                if entry.mode() == Mode::Read {
                    top.log.remove(id);
                }
            }
        }
    });
}

/// Commits the transaction `expected_id`, which must be the current
/// innermost transaction on this thread (§4.4, §4.6).
pub(crate) fn commit_current(expected_id: TxnId) -> Result<()> {
    let (frame, depth) = STACK.with(|s| {
        let mut stack = s.borrow_mut();
        let depth = stack.len();
        if depth == 0 || stack[depth - 1].id != expected_id {
            warn!(txn = %expected_id, "commit attempted while a nested transaction is still active");
            return Err(Error::NestedPending);
        }
        Ok((stack.pop().unwrap(), depth))
    })?;

    if depth > 1 {
        STACK.with(|s| {
            let mut stack = s.borrow_mut();
            let parent_idx = stack.len() - 1;
            merge_into_parent(&mut stack[parent_idx], frame)
        })
    } else {
        commit_outermost(frame)
    }
}

/// Merges a committed nested transaction's log into its parent (§4.4):
/// writes replace the parent's entry outright; reads must agree with any
/// existing parent entry for the same variable or the merge fails.
fn merge_into_parent(parent: &mut Inner, child: Inner) -> Result<()> {
    let child_id = child.id;
    for (id, entry) in child.log {
        match entry.mode() {
            Mode::Write => {
                parent.log.insert(id, entry);
            }
            Mode::Read => {
                if let Some(existing) = parent.log.get(id) {
                    if existing.snapshot_version() != entry.snapshot_version() {
                        warn!(
                            txn = %child_id,
                            var = %id,
                            "nested commit conflict: inner read incompatible with outer read"
                        );
                        return Err(Error::Conflict);
                    }
                } else {
                    parent.log.insert(id, entry);
                }
            }
        }
    }
    debug!(txn = %child_id, "nested transaction merged into parent");
    Ok(())
}

/// How many times Phase 1 spins on a contended variable before giving up.
/// Commit critical sections are always a handful of field writes (never
/// user code), so a held lock almost always clears within a few spins;
/// fixed rather than configurable, since no scenario in this codebase has
/// needed to tune it.
const LOCK_ACQUIRE_SPINS: u32 = 16;

fn try_acquire_with_spin(entry: &dyn ErasedEntry, txn: TxnId) -> bool {
    for attempt in 0..LOCK_ACQUIRE_SPINS {
        if entry.try_acquire(txn) {
            return true;
        }
        if attempt + 1 < LOCK_ACQUIRE_SPINS {
            std::hint::spin_loop();
        }
    }
    false
}

/// Runs the full three-phase commit protocol for an outermost transaction
/// (§4.4), deferring Phase 3 to an ambient coordinator if one is enlisted
/// on this thread (§4.6).
fn commit_outermost(frame: Inner) -> Result<()> {
    let mut acquired: Vec<VarId> = Vec::new();
    for (id, entry) in frame.log.iter() {
        if entry.mode() == Mode::Write {
            if try_acquire_with_spin(entry.as_ref(), frame.id) {
                acquired.push(*id);
            } else {
                for aid in &acquired {
                    if let Some(e) = frame.log.get(*aid) {
                        e.release(frame.id);
                    }
                }
                warn!(txn = %frame.id, var = %id, "commit Phase 1 failed: variable owned elsewhere after spinning");
                return Err(Error::Conflict);
            }
        }
    }

    let validation = validate_log(&frame.log);
    if !validation.is_valid() {
        for aid in &acquired {
            if let Some(e) = frame.log.get(*aid) {
                e.release(frame.id);
            }
        }
        warn!(
            txn = %frame.id,
            conflicts = validation.conflicts().len(),
            "commit Phase 2 failed validation"
        );
        return Err(Error::Conflict);
    }

    if let Some(coordinator) = coordinator::current() {
        info!(txn = %frame.id, "deferring publish to ambient coordinator");
        coordinator.enlist(StmParticipant {
            id: frame.id,
            log: frame.log,
        });
        return Ok(());
    }

    if frame.log.has_writes() {
        let commit_version = clock::advance();
        for (id, mut entry) in frame.log {
            entry.publish(commit_version, frame.id);
            debug!(txn = %frame.id, var = %id, version = commit_version, "published");
        }
    } else {
        debug!(txn = %frame.id, "read-only transaction committed");
    }
    Ok(())
}

/// `Dispose` (§6): aborts `id` if it is still the innermost transaction on
/// this thread. A no-op if `id` already committed (and was popped) or lost
/// a commit race to a sibling.
pub(crate) fn abort_if_top(id: TxnId) {
    STACK.with(|s| {
        let mut stack = s.borrow_mut();
        if let Some(top) = stack.last() {
            if top.id == id {
                stack.pop();
                trace!(txn = %id, "transaction aborted (disposed without commit)");
            }
        }
    });
}
