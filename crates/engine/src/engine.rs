//! The engine facade and the user-facing `Variable<T>` handle (C2/C4, §6).

use stm_concurrency::VarCell;
use stm_core::{Duplicate, Result, VarId};

use crate::current;

/// A handle to a transactional variable of type `T`.
///
/// Cloning a `Variable<T>` is cheap (an `Arc` bump) and yields another
/// handle to the same underlying cell, mirroring the original's "identity
/// is stable for the lifetime of V" invariant.
pub struct Variable<T: Duplicate> {
    cell: VarCell<T>,
}

impl<T: Duplicate> Clone for Variable<T> {
    fn clone(&self) -> Self {
        Variable {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Duplicate> Variable<T> {
    pub(crate) fn from_cell(cell: VarCell<T>) -> Self {
        Variable { cell }
    }

    /// This variable's stable identity.
    pub fn id(&self) -> VarId {
        self.cell.id()
    }

    /// `Read(V)` (§4.3): returns the value visible to the current
    /// transaction, or [`stm_core::Error::NotInTransaction`] if there is
    /// none on this thread.
    pub fn read(&self) -> Result<T> {
        current::open_for_read(&self.cell)
    }

    /// `OpenForWrite(V)` (§4.3): returns a private working copy that may be
    /// mutated freely; the mutation is only visible to other transactions
    /// after a successful commit.
    pub fn open_for_write(&self) -> Result<T> {
        current::open_for_write(&self.cell)
    }

    /// `Set(V, new_value)` (§4.3): replaces the working copy wholesale.
    pub fn set(&self, value: T) -> Result<()> {
        current::set(&self.cell, value)
    }

    /// `Release(V)` (§4.3): a best-effort hint that this variable will not
    /// participate in conflict detection for the remainder of the current
    /// transaction. A no-op if the variable was never opened, or was
    /// already opened for write.
    pub fn release(&self) {
        current::release_hint(self.cell.id());
    }

    /// `ReadWithoutOpening()` (§6): a non-transactional snapshot for
    /// diagnostics and tests. Never participates in any transaction's
    /// conflict detection.
    pub fn read_without_opening(&self) -> (T, u64) {
        self.cell.read_committed()
    }
}

/// The engine facade: allocates variables and begins transactions.
///
/// Zero-sized: the clock and the per-thread transaction stack are
/// process/thread-global state (§3), so every `Engine` value behaves
/// identically. Kept as a concrete type (rather than free functions) to
/// match the original's `Allocate`/`Create` vocabulary and to leave room
/// for per-instance configuration later without a breaking API change.
#[derive(Debug, Default, Clone, Copy)]
pub struct Engine;

impl Engine {
    /// A new engine handle.
    pub fn new() -> Self {
        Engine
    }

    /// `Allocate<T>(initial)` (§6): allocates a new variable, publishing
    /// `initial` at version 0. `T: Duplicate` is required at compile time
    /// (§4.1), so this can only fail along paths documented in §4.7; in
    /// practice it always succeeds.
    pub fn allocate<T: Duplicate>(&self, initial: T) -> Result<Variable<T>> {
        Ok(Variable::from_cell(VarCell::new(initial)))
    }

    /// `Create()` (§6): begins a new innermost transaction on the current
    /// thread (nested if one already exists).
    pub fn create(&self) -> crate::Transaction {
        current::begin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stm_core::Error;

    #[test]
    fn read_without_a_transaction_fails() {
        let engine = Engine::new();
        let var = engine.allocate(1i64).unwrap();
        assert!(matches!(var.read(), Err(Error::NotInTransaction)));
    }

    #[test]
    fn read_without_opening_does_not_require_a_transaction() {
        let engine = Engine::new();
        let var = engine.allocate(5i64).unwrap();
        assert_eq!(var.read_without_opening(), (5, 0));
    }

    #[test]
    fn open_for_write_then_commit_publishes_new_version() {
        let engine = Engine::new();
        let var = engine.allocate(1i64).unwrap();
        let txn = engine.create();
        let current = var.open_for_write().unwrap();
        var.set(current + 1).unwrap();
        txn.commit().unwrap();
        assert_eq!(var.read_without_opening(), (2, 1));
    }
}
