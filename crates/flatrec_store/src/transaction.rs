//! Read and write transactions.

use crate::config::DebugFlags;
use crate::cursor::Cursor;
use crate::error::{StoreError, StoreResult};
use crate::persist;
use crate::snapshot::Snapshot;
use crate::store::Store;
use crate::types::{EntityTypeId, TransactionId};
use parking_lot::MutexGuard;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnMode {
    Read,
    Write,
}

/// A transaction over a [`Store`].
///
/// A read transaction sees the state committed when it began. A write
/// transaction works on a private copy that becomes visible to new
/// transactions on [`Transaction::commit`]. Dropping an active transaction
/// aborts it.
pub struct Transaction<'s> {
    store: &'s Store,
    id: TransactionId,
    mode: TxnMode,
    state: TransactionState,
    snapshot: Arc<Snapshot>,
    write_guard: Option<MutexGuard<'s, ()>>,
    dirty: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(
        store: &'s Store,
        id: TransactionId,
        mode: TxnMode,
        snapshot: Arc<Snapshot>,
        write_guard: Option<MutexGuard<'s, ()>>,
    ) -> Self {
        let txn = Self {
            store,
            id,
            mode,
            state: TransactionState::Active,
            snapshot,
            write_guard,
            dirty: false,
        };
        if txn.logs() {
            debug!(txn = %id, write = txn.is_write(), "transaction started");
        }
        txn
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns true for write transactions.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.mode == TxnMode::Write
    }

    /// The store this transaction belongs to.
    #[must_use]
    pub fn store(&self) -> &'s Store {
        self.store
    }

    /// Opens a cursor over one entity type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown entity type or
    /// [`StoreError::IllegalState`] if the transaction has ended.
    pub fn cursor(&mut self, entity: EntityTypeId) -> StoreResult<Cursor<'_, 's>> {
        self.ensure_active()?;
        let store = self.store;
        let entity = store.inner.model.require_entity(entity)?;
        Ok(Cursor::new(self, entity))
    }

    /// Makes the changes visible and durable, then ends the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] for read or ended transactions.
    /// If writing the data file fails the transaction is aborted and the I/O
    /// error returned.
    pub fn commit(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        if !self.is_write() {
            return Err(StoreError::illegal_state(
                "cannot commit a read transaction",
            ));
        }

        if self.dirty {
            let store = self.store;
            let inner = &store.inner;
            if let Some(dir) = &inner.config.directory {
                if let Err(err) = persist::save(dir, &self.snapshot, &inner.model, &inner.config) {
                    self.finish(TransactionState::Aborted);
                    return Err(err);
                }
            }
            *inner.committed.write() = Arc::clone(&self.snapshot);
        }
        self.finish(TransactionState::Committed);
        Ok(())
    }

    /// Discards the changes and ends the transaction. Read transactions are
    /// ended this way too.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn abort(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.finish(TransactionState::Aborted);
        Ok(())
    }

    pub(crate) fn ensure_active(&self) -> StoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StoreError::illegal_state(format!(
                "transaction {} is {:?}",
                self.id, self.state
            )))
        }
    }

    pub(crate) fn snapshot(&self) -> StoreResult<&Snapshot> {
        self.ensure_active()?;
        Ok(&self.snapshot)
    }

    pub(crate) fn snapshot_mut(&mut self) -> StoreResult<&mut Snapshot> {
        self.ensure_active()?;
        if !self.is_write() {
            return Err(StoreError::illegal_state(
                "cannot write in a read transaction",
            ));
        }
        self.dirty = true;
        Ok(Arc::make_mut(&mut self.snapshot))
    }

    fn logs(&self) -> bool {
        let flag = match self.mode {
            TxnMode::Read => DebugFlags::LOG_TRANSACTIONS_READ,
            TxnMode::Write => DebugFlags::LOG_TRANSACTIONS_WRITE,
        };
        self.store.debug_flags().contains(flag)
    }

    fn finish(&mut self, state: TransactionState) {
        self.state = state;
        match self.mode {
            TxnMode::Read => {
                self.store.inner.readers.fetch_sub(1, Ordering::AcqRel);
            }
            TxnMode::Write => {
                *self.store.inner.writer.lock() = None;
                drop(self.write_guard.take());
            }
        }
        if self.logs() {
            debug!(txn = %self.id, ?state, "transaction finished");
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            if self.is_write() && self.dirty {
                warn!(txn = %self.id, "write transaction dropped without commit, aborting");
            }
            self.finish(TransactionState::Aborted);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
