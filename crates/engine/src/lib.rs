//! Transaction lifecycle, nesting, retry, and ambient-coordinator
//! enlistment (C4) — the public STM engine.
//!
//! This is the crate application code and the `stm-collections` crate
//! depend on directly. It composes `stm-concurrency`'s variable cells and
//! logs into the thread-ambient transaction model described in §3-§4.6.

mod clock;
mod coordinator;
mod current;
mod engine;
mod retry;
mod transaction;

pub use clock::current as clock_value;
pub use coordinator::{clear_ambient, enlist_ambient, AmbientCoordinator, StmParticipant};
pub use current::depth;
pub use engine::{Engine, Variable};
pub use retry::{retry, retry_with, RetryConfig};
pub use transaction::Transaction;

pub use stm_core::{Cloneable, Duplicate, Error, Immutable, Policy, Result, TxnId, VarId};
