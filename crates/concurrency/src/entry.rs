//! Transaction log entries (C3).
//!
//! A log holds one [`Entry`][TypedEntry] per opened variable, but variables
//! in the same log can carry different concrete value types. Rather than
//! one `HashMap<VarId, Entry<T>>` per type, the log stores entries behind
//! the [`ErasedEntry`] trait object and the typed `Variable<T>` handle that
//! created an entry downcasts it back via `as_any`/`as_any_mut` — the
//! idiomatic Rust analogue of a single heterogeneous log.

use std::any::Any;

use stm_core::{Duplicate, TxnId, VarId};

use crate::variable::VarCell;

/// Whether a log entry has only been read, or has been opened for write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
}

/// Type-erased operations the commit protocol needs on a log entry,
/// regardless of the entry's concrete value type.
pub trait ErasedEntry: Send + Sync {
    /// Identity of the variable this entry was opened for.
    fn var_id(&self) -> VarId;
    /// Current mode of this entry.
    fn mode(&self) -> Mode;
    /// The version observed when this variable was first opened.
    fn snapshot_version(&self) -> u64;
    /// Upgrades a Read entry to Write in place, duplicating `original` into
    /// `working` via the value's [`Duplicate`] policy. A no-op if already
    /// in Write mode.
    fn upgrade_to_write(&mut self);
    /// Phase 1 of commit: attempt to acquire this entry's variable for `txn`.
    fn try_acquire(&self, txn: TxnId) -> bool;
    /// Releases this entry's variable if owned by `txn`.
    fn release(&self, txn: TxnId);
    /// Phase 2 of commit: true iff the variable's current committed version
    /// still equals this entry's snapshot version.
    fn is_current(&self) -> bool;
    /// Phase 3 of commit: publishes the working value (Write entries only)
    /// at `commit_version` and releases ownership. A no-op for Read entries.
    fn publish(&mut self, commit_version: u64, txn: TxnId);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A log entry for a variable of concrete type `T`.
pub struct TypedEntry<T: Duplicate> {
    var: VarCell<T>,
    snapshot_version: u64,
    original: T,
    working: Option<T>,
    mode: Mode,
}

impl<T: Duplicate> TypedEntry<T> {
    /// Builds a fresh Read entry from a just-taken snapshot.
    pub fn new_read(var: VarCell<T>, original: T, snapshot_version: u64) -> Self {
        TypedEntry {
            var,
            snapshot_version,
            original,
            working: None,
            mode: Mode::Read,
        }
    }

    /// Builds a fresh Write entry, e.g. when a variable is opened for write
    /// before ever being read in this transaction.
    pub fn new_write(
        var: VarCell<T>,
        original: T,
        snapshot_version: u64,
        working: T,
    ) -> Self {
        TypedEntry {
            var,
            snapshot_version,
            original,
            working: Some(working),
            mode: Mode::Write,
        }
    }

    /// The handle to this entry's variable.
    pub fn var(&self) -> &VarCell<T> {
        &self.var
    }

    /// The value this entry currently exposes to the owning transaction:
    /// `working` if opened for write, else `original`. Always an
    /// independent duplicate, never an alias into the entry's own state.
    pub fn current_value(&self) -> T {
        match &self.working {
            Some(w) => w.duplicate(),
            None => self.original.duplicate(),
        }
    }

    /// Replaces the working copy wholesale (the `Set` operation), upgrading
    /// to Write mode if not already.
    pub fn set_working(&mut self, value: T) {
        self.working = Some(value);
        self.mode = Mode::Write;
    }
}

impl<T: Duplicate> ErasedEntry for TypedEntry<T> {
    fn var_id(&self) -> VarId {
        self.var.id()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn snapshot_version(&self) -> u64 {
        self.snapshot_version
    }

    fn upgrade_to_write(&mut self) {
        if self.mode == Mode::Read {
            self.working = Some(self.original.duplicate());
            self.mode = Mode::Write;
        }
    }

    fn try_acquire(&self, txn: TxnId) -> bool {
        self.var.try_acquire(txn)
    }

    fn release(&self, txn: TxnId) {
        self.var.release(txn)
    }

    fn is_current(&self) -> bool {
        self.var.current_version() == self.snapshot_version
    }

    fn publish(&mut self, commit_version: u64, txn: TxnId) {
        if let Some(value) = self.working.take() {
            self.var.publish(value, commit_version, txn);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
