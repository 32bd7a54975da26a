//! The public transaction handle (C4).

use std::marker::PhantomData;

use stm_core::{Result, TxnId};

use crate::current;

/// A handle to an active transaction on the current thread.
///
/// Obtained from [`crate::Engine::create`]. Deliberately not `Send`:
/// transactions are tied to the operating-system thread that created them
/// and are never migratable across threads (§5).
pub struct Transaction {
    id: TxnId,
    _not_send: PhantomData<*const ()>,
}

impl Transaction {
    pub(crate) fn new(id: TxnId) -> Self {
        Transaction {
            id,
            _not_send: PhantomData,
        }
    }

    /// This transaction's identity, for diagnostics.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Commits this transaction (§4.4). If an ambient coordinator is
    /// enlisted on this thread and this is the outermost transaction,
    /// publishing is deferred to that coordinator instead (§4.6).
    ///
    /// Consumes `self`; dropping a `Transaction` without calling `commit`
    /// aborts it (`Dispose` in the original vocabulary).
    pub fn commit(self) -> Result<()> {
        current::commit_current(self.id)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        current::abort_if_top(self.id);
    }
}
