//! # stm
//!
//! A software transactional memory runtime and a small set of
//! transactional collections built on it: a fixed-length array, a
//! coalesced-hashing dictionary, and a left-leaning red-black sorted map.
//!
//! Transactions are ambient per-thread: a block of reads and writes runs
//! inside [`retry`], and the engine commits it optimistically, retrying on
//! conflict with an external writer rather than holding locks for the
//! whole block.
//!
//! # Quick Start
//!
//! ```
//! use stm::{retry, Engine};
//!
//! fn main() -> stm::Result<()> {
//!     let engine = Engine::new();
//!     let balance = engine.allocate(100i64)?;
//!
//!     retry(|| {
//!         let current = balance.read()?;
//!         balance.set(current - 30)
//!     })?;
//!
//!     assert_eq!(retry(|| balance.read())?, 70);
//!     Ok(())
//! }
//! ```
//!
//! Collections follow the same pattern, each operation retrying on its own:
//!
//! ```
//! use stm::{Engine, TransactionalSortedMap};
//!
//! fn main() -> stm::Result<()> {
//!     let engine = Engine::new();
//!     let map = TransactionalSortedMap::<i64, &str>::new(engine)?;
//!     map.insert(3, "three")?;
//!     map.insert(1, "one")?;
//!     assert_eq!(map.keys()?, vec![1, 3]);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! `stm-core` defines the error type, identities, and the [`Duplicate`]
//! classifier that lets a `Variable<T>` hand out private copies without
//! sharing mutable state with committed memory. `stm-concurrency` holds
//! the versioned variable cells and the per-transaction log used for
//! conflict detection. `stm-engine` drives the transaction lifecycle:
//! nesting, the commit protocol, retry/backoff, and enlistment of an
//! ambient [`AmbientCoordinator`] for two-phase commit alongside an
//! external resource. `stm-collections` is the layer most callers want;
//! only it and the engine's public surface are re-exported here.

pub use stm_collections::{TransactionalArray, TransactionalDictionary, TransactionalSortedMap};
pub use stm_engine::{
    clear_ambient, clock_value, depth, enlist_ambient, retry, retry_with, AmbientCoordinator,
    Cloneable, Duplicate, Engine, Error, Immutable, Policy, Result, RetryConfig, StmParticipant,
    Transaction, TxnId, VarId, Variable,
};
