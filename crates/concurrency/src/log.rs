//! Per-transaction read/write log (C3).

use std::collections::BTreeMap;
use std::collections::btree_map;

use stm_core::VarId;

use crate::entry::ErasedEntry;

/// Maps each opened variable's identity to its log entry.
///
/// Backed by a `BTreeMap` rather than a hash map so iteration is always in
/// ascending `VarId` order — exactly the tie-break order the commit
/// protocol's Phase 1 lock acquisition requires (§4.4), with no separate
/// sort needed at commit time.
#[derive(Default)]
pub struct TransactionLog {
    entries: BTreeMap<VarId, Box<dyn ErasedEntry>>,
}

impl TransactionLog {
    /// An empty log.
    pub fn new() -> Self {
        TransactionLog {
            entries: BTreeMap::new(),
        }
    }

    /// Looks up the entry for `id`, if this transaction has opened it.
    pub fn get(&self, id: VarId) -> Option<&dyn ErasedEntry> {
        self.entries.get(&id).map(|b| b.as_ref())
    }

    /// Mutable access to the boxed entry for `id`, e.g. to upgrade it to
    /// Write mode or downcast it back to its concrete type.
    pub fn get_mut(&mut self, id: VarId) -> Option<&mut Box<dyn ErasedEntry>> {
        self.entries.get_mut(&id)
    }

    /// Inserts a new entry, replacing any previous entry for the same
    /// variable — each variable appears at most once in a log.
    pub fn insert(&mut self, id: VarId, entry: Box<dyn ErasedEntry>) {
        self.entries.insert(id, entry);
    }

    /// Removes and returns the entry for `id`, used by the best-effort
    /// `Release` hint.
    pub fn remove(&mut self, id: VarId) -> Option<Box<dyn ErasedEntry>> {
        self.entries.remove(&id)
    }

    pub fn contains(&self, id: VarId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in ascending `VarId` order — the commit lock order.
    pub fn iter(&self) -> impl Iterator<Item = (&VarId, &Box<dyn ErasedEntry>)> {
        self.entries.iter()
    }

    /// Mutable entries in ascending `VarId` order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&VarId, &mut Box<dyn ErasedEntry>)> {
        self.entries.iter_mut()
    }

    /// True iff any entry is a Write entry.
    pub fn has_writes(&self) -> bool {
        self.entries.values().any(|e| e.mode() == crate::entry::Mode::Write)
    }
}

impl IntoIterator for TransactionLog {
    type Item = (VarId, Box<dyn ErasedEntry>);
    type IntoIter = btree_map::IntoIter<VarId, Box<dyn ErasedEntry>>;

    /// Consumes the log, yielding its entries in ascending `VarId` order.
    /// Used when merging a committed nested transaction's log into its
    /// parent (§4.4).
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
