//! Monotonically increasing identities for variables and transactions.
//!
//! Both ids are backed by a process-global `AtomicU64` counter and are
//! totally ordered by allocation time. `TxnId` ordering in particular is
//! relied on by the validation phase (Section 4.4) to size and order the
//! write-set lock acquisition.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a transactional variable, assigned once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(u64);

impl VarId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        VarId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a fresh, process-unique `VarId`.
    pub fn fresh() -> Self {
        Self::next()
    }

    /// Returns the raw numeric value, for logging only.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

/// Identity of a transaction, assigned once at `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxnId(u64);

impl TxnId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TxnId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a fresh, process-unique `TxnId`.
    pub fn fresh() -> Self {
        Self::next()
    }

    /// Returns the raw numeric value, for logging only.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let a = VarId::fresh();
        let b = VarId::fresh();
        assert!(b > a);

        let x = TxnId::fresh();
        let y = TxnId::fresh();
        assert!(y > x);
    }

    #[test]
    fn display_is_stable() {
        let v = VarId::fresh();
        assert!(v.to_string().starts_with("var#"));
        let t = TxnId::fresh();
        assert!(t.to_string().starts_with("txn#"));
    }
}
