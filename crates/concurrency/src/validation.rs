//! Conflict classification and Phase 2 validation (C3/C4).
//!
//! Only `Error::Conflict` is ever user-visible (§4.7), but internally we
//! keep a small taxonomy of *why* validation failed — this is what feeds
//! the `debug`/`warn` tracing events around commit (C9) so contention can
//! be diagnosed from logs without reproducing it under a debugger.

use std::fmt;

use stm_core::VarId;
use tracing::trace;

use crate::log::TransactionLog;

/// Why a single variable failed validation or lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// The variable's committed version has advanced past this entry's
    /// snapshot version.
    StaleRead { var: VarId },
    /// Phase 1 could not acquire the variable because another transaction
    /// currently owns it.
    LockAcquisitionFailed { var: VarId },
    /// An inner transaction's read of `var` disagrees with the outer
    /// transaction's prior read of the same variable (§4.4 nested merge).
    NestedReadIncompatible { var: VarId },
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::StaleRead { var } => {
                write!(f, "{var} was modified by another transaction since it was opened")
            }
            ConflictType::LockAcquisitionFailed { var } => {
                write!(f, "{var} is owned by another committing transaction")
            }
            ConflictType::NestedReadIncompatible { var } => write!(
                f,
                "{var}'s inner-transaction read disagrees with the outer transaction's read"
            ),
        }
    }
}

/// The outcome of a validation pass: empty means the transaction may
/// proceed to publish.
#[derive(Debug, Default, Clone)]
pub struct ValidationResult {
    conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// No conflicts found.
    pub fn ok() -> Self {
        ValidationResult::default()
    }

    /// A single conflict.
    pub fn conflict(c: ConflictType) -> Self {
        ValidationResult { conflicts: vec![c] }
    }

    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn conflicts(&self) -> &[ConflictType] {
        &self.conflicts
    }

    pub fn push(&mut self, c: ConflictType) {
        self.conflicts.push(c);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }
}

/// Phase 2 of commit (§4.4): every entry's snapshot version must still
/// match the variable's current committed version, for both Read and
/// Write entries.
pub fn validate_log(log: &TransactionLog) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (id, entry) in log.iter() {
        if !entry.is_current() {
            trace!(var = %id, "validation failed: stale read");
            result.push(ConflictType::StaleRead { var: *id });
        }
    }
    result
}
