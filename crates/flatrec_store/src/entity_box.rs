//! Typed access to the objects of one entity type.

use crate::error::{StoreError, StoreResult};
use crate::query::{Query, QueryBuilder};
use crate::store::Store;
use crate::transaction::Transaction;
use crate::types::{EntityTypeId, PutMode};
use flatrec_codec::Entity;
use std::fmt;
use std::marker::PhantomData;

/// Objects of the generated record type `T`, stored and read as buffers.
///
/// Methods without a transaction argument run in their own transaction.
/// The `*_in` variants join one the caller already holds, which is how
/// several operations are made atomic.
///
/// ```
/// flatrec_codec::define_table! {
///     pub mod task {
///         table Task;
///         id id;
///         fields {
///             0 => id: u64,
///             1 => title: string,
///             2 => done: bool,
///         }
///     }
/// }
///
/// use flatrec_store::{Model, Store};
///
/// let mut model = Model::new();
/// model.add_entity_of::<task::Record>().unwrap();
/// let store = Store::open_in_memory(model).unwrap();
/// let tasks = store.entity_box::<task::Record>().unwrap();
///
/// let mut first = task::Record { title: Some("write docs".into()), ..Default::default() };
/// let id = tasks.put(&mut first).unwrap();
/// assert_eq!(first.id, id);
/// assert_eq!(tasks.get(id).unwrap(), Some(first));
/// ```
pub struct EntityBox<T: Entity> {
    store: Store,
    entity: EntityTypeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityBox<T> {
    pub(crate) fn new(store: Store) -> StoreResult<Self> {
        let name = &T::schema().name;
        let entity = store.model().entity_id(name).ok_or_else(|| {
            StoreError::illegal_argument(format!("entity {name} is not in the model"))
        })?;
        let registered = store.model().require_entity(entity)?;
        if registered.id_field() != T::ID_FIELD {
            return Err(StoreError::schema(format!(
                "entity {name} has id field {} in the model but {} in the record",
                registered.id_field(),
                T::ID_FIELD
            )));
        }
        Ok(Self {
            store,
            entity,
            _marker: PhantomData,
        })
    }

    /// The entity type id.
    pub fn entity(&self) -> EntityTypeId {
        self.entity
    }

    /// The store this box belongs to.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Stores `object`, assigning it the next id when its id is zero.
    /// Returns the id it was stored under.
    ///
    /// # Errors
    ///
    /// See [`Cursor::put`](crate::Cursor::put).
    pub fn put(&self, object: &mut T) -> StoreResult<u64> {
        self.store.write(|txn| self.put_in(txn, object))
    }

    /// Stores `object` within `txn`.
    ///
    /// # Errors
    ///
    /// See [`Cursor::put`](crate::Cursor::put).
    pub fn put_in(&self, txn: &mut Transaction<'_>, object: &mut T) -> StoreResult<u64> {
        self.store_in(txn, object, PutMode::Put)
    }

    /// Stores `object` only if no object has its id yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolated`] for a taken id, otherwise as
    /// [`EntityBox::put`].
    pub fn insert(&self, object: &mut T) -> StoreResult<u64> {
        self.store.write(|txn| self.store_in(txn, object, PutMode::Insert))
    }

    /// Stores all `objects` in one transaction. Either all are stored or
    /// none are.
    ///
    /// # Errors
    ///
    /// Returns the first put error.
    pub fn put_many(&self, objects: &mut [T]) -> StoreResult<Vec<u64>> {
        self.store.write(|txn| {
            objects
                .iter_mut()
                .map(|object| self.store_in(txn, object, PutMode::Put))
                .collect()
        })
    }

    /// Reads the object stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the stored buffer cannot be read as `T`.
    pub fn get(&self, id: u64) -> StoreResult<Option<T>> {
        self.store.read(|txn| self.get_in(txn, id))
    }

    /// Reads one object within `txn`, seeing its uncommitted changes.
    ///
    /// # Errors
    ///
    /// Same as [`EntityBox::get`].
    pub fn get_in(&self, txn: &mut Transaction<'_>, id: u64) -> StoreResult<Option<T>> {
        match txn.cursor(self.entity)?.get(id)? {
            Some(bytes) => Ok(Some(T::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads every object in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Allocation`] if the result does not fit in
    /// memory, or a decode error.
    pub fn get_all(&self) -> StoreResult<Vec<T>> {
        self.store.read(|txn| {
            txn.cursor(self.entity)?
                .get_all()?
                .iter()
                .map(|bytes| T::from_bytes(bytes).map_err(StoreError::from))
                .collect()
        })
    }

    /// Whether an object is stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if no read transaction can be started.
    pub fn contains(&self, id: u64) -> StoreResult<bool> {
        self.store.read(|txn| txn.cursor(self.entity)?.seek(id))
    }

    /// Number of stored objects.
    ///
    /// # Errors
    ///
    /// Returns an error if no read transaction can be started.
    pub fn count(&self) -> StoreResult<u64> {
        self.store.read(|txn| txn.cursor(self.entity)?.count())
    }

    /// Whether no objects are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if no read transaction can be started.
    pub fn is_empty(&self) -> StoreResult<bool> {
        self.store.read(|txn| txn.cursor(self.entity)?.is_empty())
    }

    /// Removes the object stored under `id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if no write transaction can be started or the
    /// commit fails.
    pub fn remove(&self, id: u64) -> StoreResult<bool> {
        self.store.write(|txn| self.remove_in(txn, id))
    }

    /// Removes one object within `txn`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] outside a write transaction.
    pub fn remove_in(&self, txn: &mut Transaction<'_>, id: u64) -> StoreResult<bool> {
        txn.cursor(self.entity)?.remove(id)
    }

    /// Removes every object. Returns how many were removed. Assigned ids
    /// keep increasing afterwards.
    ///
    /// # Errors
    ///
    /// Same as [`EntityBox::remove`].
    pub fn remove_all(&self) -> StoreResult<u64> {
        self.store.write(|txn| txn.cursor(self.entity)?.remove_all())
    }

    /// Starts a query over this entity type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the store is closed.
    pub fn query(&self) -> StoreResult<QueryBuilder> {
        self.store.query(self.entity)
    }

    /// Runs `query` and decodes the objects it finds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for a query over another
    /// entity type, otherwise as [`Query::find`].
    pub fn find(&self, query: &Query) -> StoreResult<Vec<T>> {
        if query.entity() != self.entity {
            return Err(StoreError::illegal_argument(format!(
                "query is for {} but this box holds {}",
                query.entity(),
                self.entity
            )));
        }
        self.store.read(|txn| {
            query
                .find(txn, 0, 0)?
                .iter()
                .map(|bytes| T::from_bytes(bytes).map_err(StoreError::from))
                .collect()
        })
    }

    fn store_in(
        &self,
        txn: &mut Transaction<'_>,
        object: &mut T,
        mode: PutMode,
    ) -> StoreResult<u64> {
        let mut cursor = txn.cursor(self.entity)?;
        let id = cursor.id_for_put(object.entity_id())?;
        object.set_entity_id(id);
        cursor.put(id, object.to_bytes()?, mode)?;
        Ok(id)
    }
}

impl<T: Entity> Clone for EntityBox<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            entity: self.entity,
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for EntityBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityBox")
            .field("entity", &self.entity)
            .field("name", &T::schema().name)
            .finish()
    }
}
