//! The store handle.

use crate::config::{DebugFlags, StoreConfig};
use crate::entity_box::EntityBox;
use crate::error::{StoreError, StoreResult};
use crate::model::Model;
use crate::persist;
use crate::query::QueryBuilder;
use crate::snapshot::Snapshot;
use crate::transaction::{Transaction, TxnMode};
use crate::types::{EntityTypeId, TransactionId};
use flatrec_codec::Entity;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::info;

pub(crate) struct StoreInner {
    pub(crate) model: Model,
    pub(crate) config: StoreConfig,
    /// Last committed state.
    pub(crate) committed: RwLock<Arc<Snapshot>>,
    /// Held by the one active write transaction.
    pub(crate) write_lock: Mutex<()>,
    /// Thread owning the write lock.
    pub(crate) writer: Mutex<Option<ThreadId>>,
    pub(crate) readers: AtomicU32,
    pub(crate) next_txn: AtomicU64,
    pub(crate) open: AtomicBool,
    pub(crate) debug_flags: AtomicU32,
}

/// An open object store.
///
/// `Store` is a cheap handle: clones share the same data. It is `Send` and
/// `Sync`; one write transaction runs at a time while any number of read
/// transactions (up to the configured limit) see stable snapshots.
///
/// # Example
///
/// ```
/// use flatrec_codec::{FieldDef, ScalarType, TableSchema};
/// use flatrec_store::{Model, PutMode, Store, StoreConfig};
///
/// static FIELDS: [FieldDef; 2] = [
///     FieldDef::scalar(0, "id", ScalarType::UInt64),
///     FieldDef::string(1, "text"),
/// ];
/// static NOTE: TableSchema = TableSchema::new("Note", &FIELDS);
///
/// let mut model = Model::new();
/// let note = model.add_entity(&NOTE, 0).unwrap();
/// let store = Store::open(model, StoreConfig::new()).unwrap();
///
/// let record = flatrec_codec::Record::new().with(0, 1u64).with(1, "hello");
/// let bytes = record.to_bytes(&NOTE).unwrap();
///
/// store
///     .write(|txn| txn.cursor(note)?.put(1, bytes, PutMode::Insert))
///     .unwrap();
/// let count = store.read(|txn| txn.cursor(note)?.count()).unwrap();
/// assert_eq!(count, 1);
/// ```
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Opens a store.
    ///
    /// With a directory configured, the directory is created if needed and
    /// an existing data file is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FileCorrupt`] for a damaged data file,
    /// [`StoreError::Schema`] when it holds entity types the model lacks, or
    /// an I/O error.
    pub fn open(model: Model, config: StoreConfig) -> StoreResult<Self> {
        let snapshot = match &config.directory {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                persist::load(dir, &model)?.unwrap_or_default()
            }
            None => Snapshot::default(),
        };

        info!(
            directory = ?config.directory,
            entities = model.entities().len(),
            relations = model.relations().len(),
            size = snapshot.size(),
            "store opened"
        );

        let debug_flags = AtomicU32::new(config.debug_flags.bits());
        Ok(Self {
            inner: Arc::new(StoreInner {
                model,
                config,
                committed: RwLock::new(Arc::new(snapshot)),
                write_lock: Mutex::new(()),
                writer: Mutex::new(None),
                readers: AtomicU32::new(0),
                next_txn: AtomicU64::new(1),
                open: AtomicBool::new(true),
                debug_flags,
            }),
        })
    }

    /// Opens a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Never fails today; kept fallible like [`Store::open`].
    pub fn open_in_memory(model: Model) -> StoreResult<Self> {
        Self::open(model, StoreConfig::new())
    }

    /// Closes the store for all handles. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] while transactions are active.
    pub fn close(&self) -> StoreResult<()> {
        let inner = &self.inner;
        if !self.is_open() {
            return Ok(());
        }
        // Writers check the open flag while holding the lock.
        let Some(_writer) = inner.write_lock.try_lock() else {
            return Err(StoreError::illegal_state(
                "cannot close with an active write transaction",
            ));
        };
        if !inner.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // Readers count themselves before they check the open flag.
        let readers = inner.readers.load(Ordering::SeqCst);
        if readers > 0 {
            inner.open.store(true, Ordering::SeqCst);
            return Err(StoreError::illegal_state(format!(
                "cannot close with active transactions ({readers} readers)"
            )));
        }
        info!(directory = ?inner.config.directory, "store closed");
        Ok(())
    }

    /// Returns true until [`Store::close`] succeeds.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Deletes the data files of a closed store. Returns whether any file
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file cannot be deleted.
    pub fn remove_db_files(dir: impl AsRef<Path>) -> StoreResult<bool> {
        let dir = dir.as_ref();
        let removed = persist::remove_files(dir)?;
        if removed {
            info!(directory = %dir.display(), "removed data files");
        }
        Ok(removed)
    }

    /// The model the store was opened with.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.inner.model
    }

    /// The configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Looks up an entity type by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown name.
    pub fn entity_id(&self, name: &str) -> StoreResult<EntityTypeId> {
        self.inner
            .model
            .entity_id(name)
            .ok_or_else(|| StoreError::illegal_argument(format!("unknown entity {name}")))
    }

    /// Looks up a property index by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown entity or
    /// property.
    pub fn property_id(&self, entity: EntityTypeId, name: &str) -> StoreResult<u16> {
        let entity_type = self.inner.model.require_entity(entity)?;
        entity_type.property_id(name).ok_or_else(|| {
            StoreError::illegal_argument(format!("unknown property {}.{name}", entity_type.name()))
        })
    }

    /// Current diagnostic logging switches.
    #[must_use]
    pub fn debug_flags(&self) -> DebugFlags {
        DebugFlags::from_bits(self.inner.debug_flags.load(Ordering::Relaxed))
    }

    /// Replaces the diagnostic logging switches.
    pub fn set_debug_flags(&self, flags: DebugFlags) {
        self.inner.debug_flags.store(flags.bits(), Ordering::Relaxed);
    }

    /// Accounted size of the committed data in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.committed.read().size()
    }

    /// Begins a read transaction over the current committed state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MaxReadersExceeded`] when too many read
    /// transactions are open, or [`StoreError::IllegalState`] if the store
    /// is closed.
    pub fn begin_read(&self) -> StoreResult<Transaction<'_>> {
        let max = self.inner.config.effective_max_readers();
        let previous = self.inner.readers.fetch_add(1, Ordering::SeqCst);
        if !self.inner.open.load(Ordering::SeqCst) {
            self.inner.readers.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::illegal_state("store is closed"));
        }
        if previous >= max {
            self.inner.readers.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::MaxReadersExceeded { max });
        }
        let snapshot = Arc::clone(&self.inner.committed.read());
        Ok(Transaction::new(self, self.next_txn_id(), TxnMode::Read, snapshot, None))
    }

    /// Begins a write transaction, waiting for any other writer to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the store is closed or this
    /// thread already holds a write transaction.
    pub fn begin_write(&self) -> StoreResult<Transaction<'_>> {
        self.ensure_open()?;
        let current = thread::current().id();
        if *self.inner.writer.lock() == Some(current) {
            return Err(StoreError::illegal_state(
                "a write transaction is already active on this thread",
            ));
        }
        let guard = self.inner.write_lock.lock();
        self.ensure_open()?;
        *self.inner.writer.lock() = Some(current);
        let snapshot = Arc::clone(&self.inner.committed.read());
        Ok(Transaction::new(
            self,
            self.next_txn_id(),
            TxnMode::Write,
            snapshot,
            Some(guard),
        ))
    }

    /// Runs `f` in a read transaction.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Store::begin_read`] or of `f`.
    pub fn read<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        let mut txn = self.begin_read()?;
        f(&mut txn)
    }

    /// Runs `f` in a write transaction, committing if it returns `Ok` and
    /// aborting otherwise.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Store::begin_write`], of `f`, or of the commit.
    pub fn write<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        let mut txn = self.begin_write()?;
        match f(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = txn.abort();
                Err(err)
            }
        }
    }

    /// Starts a query over one entity type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown entity type.
    pub fn query(&self, entity: EntityTypeId) -> StoreResult<QueryBuilder> {
        QueryBuilder::new(self.clone(), entity)
    }

    /// Typed access to the objects of a generated entity record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] if `T` is not in the model.
    pub fn entity_box<T: Entity>(&self) -> StoreResult<EntityBox<T>> {
        EntityBox::new(self.clone())
    }

    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::illegal_state("store is closed"))
        }
    }

    pub(crate) fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn next_txn_id(&self) -> TransactionId {
        TransactionId(self.inner.next_txn.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("directory", &self.inner.config.directory)
            .field("entities", &self.inner.model.entities().len())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PutMode;
    use flatrec_codec::{FieldDef, Record, ScalarType, TableSchema};

    static FIELDS: [FieldDef; 2] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::string(1, "text"),
    ];
    static NOTE: TableSchema = TableSchema::new("Note", &FIELDS);

    fn open(config: StoreConfig) -> (Store, EntityTypeId) {
        let mut model = Model::new();
        let note = model.add_entity(&NOTE, 0).unwrap();
        (Store::open(model, config).unwrap(), note)
    }

    fn note_bytes(id: u64, text: &str) -> Vec<u8> {
        Record::new().with(0, id).with(1, text).to_bytes(&NOTE).unwrap()
    }

    #[test]
    fn lookups_by_name() {
        let (store, note) = open(StoreConfig::new());
        assert_eq!(store.entity_id("Note").unwrap(), note);
        assert_eq!(store.property_id(note, "text").unwrap(), 1);
        assert_eq!(
            store.entity_id("Missing").unwrap_err().code(),
            StoreError::CODE_ILLEGAL_ARGUMENT
        );
        assert!(store.property_id(note, "missing").is_err());
    }

    #[test]
    fn close_is_idempotent_and_blocks_transactions() {
        let (store, _) = open(StoreConfig::new());
        store.close().unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(store.begin_read().is_err());
        assert!(store.begin_write().is_err());
    }

    #[test]
    fn close_refused_while_reading() {
        let (store, _) = open(StoreConfig::new());
        let txn = store.begin_read().unwrap();
        assert!(store.close().is_err());
        assert!(store.is_open());
        drop(txn);
        store.close().unwrap();
    }

    #[test]
    fn close_refused_while_writing() {
        let (store, _) = open(StoreConfig::new());
        let txn = store.begin_write().unwrap();
        assert_eq!(store.close().unwrap_err().code(), StoreError::CODE_ILLEGAL_STATE);
        assert!(store.is_open());
        drop(txn);
        store.close().unwrap();
    }

    #[test]
    fn no_reader_outlives_a_successful_close() {
        let (store, _) = open(StoreConfig::new());
        let closed = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| loop {
                    let Ok(txn) = store.begin_read() else {
                        break;
                    };
                    assert!(!closed.load(Ordering::SeqCst), "reader began on a closed store");
                    thread::yield_now();
                    drop(txn);
                });
            }
            while store.close().is_err() {
                thread::yield_now();
            }
            closed.store(true, Ordering::SeqCst);
        });

        assert_eq!(store.inner.readers.load(Ordering::SeqCst), 0);
        assert!(store.begin_read().is_err());
    }

    #[test]
    fn reader_limit() {
        let (store, _) = open(StoreConfig::new().max_readers(2));
        let first = store.begin_read().unwrap();
        let _second = store.begin_read().unwrap();
        let err = store.begin_read().unwrap_err();
        assert!(matches!(err, StoreError::MaxReadersExceeded { max: 2 }));
        drop(first);
        assert!(store.begin_read().is_ok());
    }

    #[test]
    fn nested_write_on_same_thread_is_refused() {
        let (store, _) = open(StoreConfig::new());
        let _txn = store.begin_write().unwrap();
        let err = store.begin_write().unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_ILLEGAL_STATE);
    }

    #[test]
    fn write_helper_aborts_on_error() {
        let (store, note) = open(StoreConfig::new());
        let result: StoreResult<()> = store.write(|txn| {
            txn.cursor(note)?.put(1, note_bytes(1, "a"), PutMode::Put)?;
            Err(StoreError::illegal_argument("stop"))
        });
        assert!(result.is_err());
        assert_eq!(store.read(|txn| txn.cursor(note)?.count()).unwrap(), 0);
        assert_eq!(store.size(), 0);
    }

    #[test]
    fn reopen_loads_committed_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (store, note) = open(StoreConfig::new().directory(dir.path()));
            store
                .write(|txn| txn.cursor(note)?.put(7, note_bytes(7, "kept"), PutMode::Insert))
                .unwrap();
            store.close().unwrap();
        }

        let (store, note) = open(StoreConfig::new().directory(dir.path()));
        let data = store.read(|txn| txn.cursor(note)?.get(7)).unwrap().unwrap();
        assert_eq!(data.as_ref(), note_bytes(7, "kept").as_slice());
        store.close().unwrap();

        assert!(Store::remove_db_files(dir.path()).unwrap());
        let (store, note) = open(StoreConfig::new().directory(dir.path()));
        assert_eq!(store.read(|txn| txn.cursor(note)?.count()).unwrap(), 0);
    }

    #[test]
    fn debug_flags_can_change() {
        let (store, _) = open(StoreConfig::new());
        assert_eq!(store.debug_flags(), DebugFlags::empty());
        store.set_debug_flags(DebugFlags::LOG_TRANSACTIONS_WRITE);
        assert!(store
            .debug_flags()
            .contains(DebugFlags::LOG_TRANSACTIONS_WRITE));
    }
}
