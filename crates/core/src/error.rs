//! Error types for the stm runtime
//!
//! This module defines the single error type shared by every crate in the
//! workspace. We use `thiserror` for `Display`/`std::error::Error` derivation,
//! matching the rest of this codebase's error types.
//!
//! ## Usage
//!
//! ```
//! use stm_core::error::Error;
//!
//! fn classify(e: &Error) {
//!     if e.is_conflict() {
//!         // caught by retry(), never seen here in practice
//!     } else if e.is_retryable() {
//!         // caller may choose to retry a non-conflict failure
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias used throughout the stm crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the stm runtime and its collections.
#[derive(Debug, Error)]
pub enum Error {
    /// The classifier rejected a value type at allocation time.
    ///
    /// For `Variable<T>` this is a compile-time fact, not a runtime check
    /// (see `stm_core::classify`): a `T` without a `Duplicate` impl simply
    /// does not type-check as a variable's payload, so this variant has no
    /// reachable construction site in this crate today. It is kept in the
    /// enum as the named error the original classifier's `Rejected` policy
    /// maps to, for any future caller that does reject a type dynamically.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A user-supplied deep-copy closure returned a value of the wrong
    /// runtime type.
    #[error("clone contract violated: {0}")]
    CloneContract(String),

    /// `Read`/`OpenForWrite` was attempted with no active transaction on
    /// this thread.
    #[error("no transaction is active on this thread")]
    NotInTransaction,

    /// `Commit` was called on a transaction that is not `Active`, or a
    /// terminated transaction was used again.
    #[error("transaction already terminated")]
    AlreadyTerminated,

    /// An outer transaction tried to commit while an inner (nested)
    /// transaction on the same thread was still live.
    #[error("cannot commit: a nested transaction is still active")]
    NestedPending,

    /// A dictionary or sorted-map lookup found no entry for the given key.
    #[error("key not found")]
    KeyNotFound,

    /// An insert rejected an already-present key.
    #[error("duplicate key")]
    DuplicateKey,

    /// An array index fell outside `0..length`.
    #[error("index {index} out of range (length {length})")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The collection's current length.
        length: usize,
    },

    /// A collection operation received an argument it cannot accept (e.g. a
    /// null/empty key where one is required).
    #[error("null or missing argument: {0}")]
    NullArgument(String),

    /// A range argument (e.g. `enlarge(new_length)`) was invalid.
    #[error("bad range: {0}")]
    BadRange(String),

    /// Optimistic-concurrency validation failed. Always caught by `retry`;
    /// a caller driving transactions manually may still observe it.
    #[error("transaction conflict")]
    Conflict,
}

impl Error {
    /// True for the one error kind `retry`/`retry_with` swallows and retries.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict)
    }

    /// True for error kinds a caller may reasonably retry itself. Conflicts
    /// are always retryable; everything else reflects a programming error or
    /// bad input and retrying it verbatim would just fail again.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}
