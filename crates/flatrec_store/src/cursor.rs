//! Cursors: per-entity access inside a transaction.

use crate::error::{StoreError, StoreResult};
use crate::model::EntityType;
use crate::snapshot::{EntityData, RelationPairs, KEY_OVERHEAD, RELATION_PAIR_SIZE};
use crate::transaction::Transaction;
use crate::types::{EntityTypeId, PutMode, RelationId};
use bytes::Bytes;
use flatrec_codec::{FieldKind, ScalarType};
use std::ops::Bound;
use tracing::trace;

/// Reads and writes the objects of one entity type within a transaction.
///
/// Objects are finished buffers keyed by their `u64` id. Returned buffers
/// share memory with the store and stay valid after the transaction ends.
/// The cursor also keeps a position for `first`/`next` iteration.
pub struct Cursor<'t, 's> {
    txn: &'t mut Transaction<'s>,
    entity: &'s EntityType,
    position: Option<u64>,
}

impl<'t, 's> Cursor<'t, 's> {
    pub(crate) fn new(txn: &'t mut Transaction<'s>, entity: &'s EntityType) -> Self {
        Self {
            txn,
            entity,
            position: None,
        }
    }

    /// The entity type this cursor works on.
    #[must_use]
    pub fn entity(&self) -> &'s EntityType {
        self.entity
    }

    /// Id of the object at the current position.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.position
    }

    fn data(&self) -> StoreResult<Option<&EntityData>> {
        Ok(self.txn.snapshot()?.entity(self.entity.id()))
    }

    fn data_mut(&mut self) -> StoreResult<&mut EntityData> {
        let id = self.entity.id();
        Ok(self.txn.snapshot_mut()?.entity_mut(id))
    }

    /// Returns the id to store a new object under.
    ///
    /// Zero reserves the next id in sequence. A non-zero id is returned as
    /// is and moves the sequence past it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] outside a write transaction.
    pub fn id_for_put(&mut self, id_or_zero: u64) -> StoreResult<u64> {
        let data = self.data_mut()?;
        if id_or_zero == 0 {
            data.last_id = data
                .last_id
                .checked_add(1)
                .ok_or_else(|| StoreError::illegal_state("id sequence exhausted"))?;
            Ok(data.last_id)
        } else {
            data.last_id = data.last_id.max(id_or_zero);
            Ok(id_or_zero)
        }
    }

    /// Stores a finished buffer under `id`.
    ///
    /// The buffer is verified against the entity schema and its id field
    /// must equal `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::IllegalState`] outside a write transaction
    /// - [`StoreError::IllegalArgument`] for id zero or an id mismatch
    /// - [`StoreError::FileCorrupt`] or [`StoreError::Schema`] for a bad buffer
    /// - [`StoreError::UniqueViolated`] when inserting over an existing id
    /// - [`StoreError::DbFull`] when the size limit would be exceeded
    pub fn put(&mut self, id: u64, data: impl Into<Bytes>, mode: PutMode) -> StoreResult<()> {
        self.txn.snapshot_mut()?;
        if id == 0 {
            return Err(StoreError::illegal_argument(
                "id must not be zero, use id_for_put to assign one",
            ));
        }

        let data = data.into();
        let schema = self.entity.schema();
        flatrec_codec::verify(&data, schema)?;
        let stored_id = flatrec_codec::root(&data, schema)?.get::<u64>(self.entity.id_field())?;
        if stored_id != id {
            return Err(StoreError::illegal_argument(format!(
                "object id {stored_id} does not match put id {id}"
            )));
        }

        let entity = self.entity;
        let max = self.txn.store().config().max_db_size_bytes();
        let snapshot = self.txn.snapshot_mut()?;
        let previous = snapshot
            .entity(entity.id())
            .and_then(|existing| existing.objects.get(&id))
            .map(|old| old.len() as u64);
        if mode == PutMode::Insert && previous.is_some() {
            return Err(StoreError::UniqueViolated {
                entity: entity.name().to_string(),
                id,
            });
        }
        let size = match previous {
            Some(old) => snapshot.size() - old + data.len() as u64,
            None => snapshot.size() + data.len() as u64 + KEY_OVERHEAD,
        };
        if size > max {
            return Err(StoreError::DbFull { size, max });
        }

        trace!(entity = entity.name(), id, len = data.len(), "put");
        snapshot.entity_mut(entity.id()).insert(id, data);
        Ok(())
    }

    /// Reads one object and moves the position to it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn get(&mut self, id: u64) -> StoreResult<Option<Bytes>> {
        let found = self
            .data()?
            .and_then(|data| data.objects.get(&id))
            .cloned();
        if found.is_some() {
            self.position = Some(id);
        }
        Ok(found)
    }

    /// Reads all objects in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Allocation`] if the result cannot be allocated.
    pub fn get_all(&self) -> StoreResult<Vec<Bytes>> {
        let Some(data) = self.data()? else {
            return Ok(Vec::new());
        };
        let mut all = Vec::new();
        all.try_reserve_exact(data.objects.len())
            .map_err(|err| StoreError::allocation(err.to_string()))?;
        all.extend(data.objects.values().cloned());
        Ok(all)
    }

    /// Moves to the object with the lowest id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn first(&mut self) -> StoreResult<Option<Bytes>> {
        let first = self
            .data()?
            .and_then(|data| data.objects.first_key_value())
            .map(|(id, bytes)| (*id, bytes.clone()));
        Ok(self.move_to(first))
    }

    /// Moves to the object after the current position, or to the first one
    /// if there is no position yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn next(&mut self) -> StoreResult<Option<Bytes>> {
        let Some(current) = self.position else {
            return self.first();
        };
        let next = self.data()?.and_then(|data| {
            data.objects
                .range((Bound::Excluded(current), Bound::Unbounded))
                .next()
                .map(|(id, bytes)| (*id, bytes.clone()))
        });
        Ok(self.move_to(next))
    }

    /// Reads the object at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn current(&self) -> StoreResult<Option<Bytes>> {
        let Some(id) = self.position else {
            return Ok(None);
        };
        Ok(self.data()?.and_then(|data| data.objects.get(&id)).cloned())
    }

    /// Moves to `id` if such an object exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn seek(&mut self, id: u64) -> StoreResult<bool> {
        let exists = self
            .data()?
            .is_some_and(|data| data.objects.contains_key(&id));
        if exists {
            self.position = Some(id);
        }
        Ok(exists)
    }

    fn move_to(&mut self, entry: Option<(u64, Bytes)>) -> Option<Bytes> {
        entry.map(|(id, bytes)| {
            self.position = Some(id);
            bytes
        })
    }

    /// Removes one object and any standalone relations it takes part in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] outside a write transaction.
    pub fn remove(&mut self, id: u64) -> StoreResult<bool> {
        let exists = self
            .data()?
            .is_some_and(|data| data.objects.contains_key(&id));
        if !exists {
            self.txn.snapshot_mut()?;
            return Ok(false);
        }
        self.data_mut()?.remove(id);
        self.drop_relations(|object| object == id)?;
        trace!(entity = self.entity.name(), id, "removed");
        Ok(true)
    }

    /// Removes every object of this entity type. The id sequence is kept.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] outside a write transaction.
    pub fn remove_all(&mut self) -> StoreResult<u64> {
        let data = self.data_mut()?;
        let count = data.objects.len() as u64;
        data.objects.clear();
        data.size = 0;
        self.drop_relations(|_| true)?;
        self.position = None;
        Ok(count)
    }

    fn drop_relations(&mut self, matches: impl Fn(u64) -> bool) -> StoreResult<()> {
        let entity = self.entity.id();
        let model = &self.txn.store().inner.model;
        for relation in model.relations() {
            let as_source = relation.source == entity;
            let as_target = relation.target == entity;
            if !as_source && !as_target {
                continue;
            }
            let hit = |&(source, target): &(u64, u64)| {
                (as_source && matches(source)) || (as_target && matches(target))
            };
            let affected = self
                .txn
                .snapshot()?
                .relation(relation.id)
                .is_some_and(|pairs| pairs.iter().any(hit));
            if affected {
                self.txn
                    .snapshot_mut()?
                    .relation_mut(relation.id)
                    .retain(|pair| !hit(pair));
            }
        }
        Ok(())
    }

    /// Number of objects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn count(&self) -> StoreResult<u64> {
        Ok(self.data()?.map_or(0, |data| data.objects.len() as u64))
    }

    /// Number of objects, counting no further than `max` (0 = no limit).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn count_max(&self, max: u64) -> StoreResult<u64> {
        let count = self.count()?;
        Ok(if max == 0 { count } else { count.min(max) })
    }

    /// Returns true if there are no objects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalState`] if the transaction has ended.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Ids of `source_entity` objects whose to-one relation `property`
    /// points at `id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::IllegalArgument`] for an unknown entity or property
    /// - [`StoreError::PropertyTypeMismatch`] if the property is not `u64`
    /// - [`StoreError::FileCorrupt`] if a stored buffer cannot be read
    pub fn backlink_ids(
        &self,
        source_entity: EntityTypeId,
        property: u16,
        id: u64,
    ) -> StoreResult<Vec<u64>> {
        let source = self.txn.store().inner.model.require_entity(source_entity)?;
        let field = source.schema().field(property).ok_or_else(|| {
            StoreError::illegal_argument(format!(
                "unknown property {}",
                source.property_name(property)
            ))
        })?;
        if field.kind != FieldKind::Scalar(ScalarType::UInt64) {
            return Err(StoreError::type_mismatch(
                source.property_name(property),
                "u64 relation",
                field.kind.describe(),
            ));
        }

        let Some(data) = self.txn.snapshot()?.entity(source_entity) else {
            return Ok(Vec::new());
        };
        let mut ids = Vec::new();
        for (object_id, bytes) in &data.objects {
            let table = flatrec_codec::root(bytes, source.schema())?;
            if table.get::<u64>(property)? == id {
                ids.push(*object_id);
            }
        }
        Ok(ids)
    }

    fn relation_from_here(&self, relation: RelationId) -> StoreResult<RelationId> {
        self.relation_at(relation, true)
    }

    fn relation_at(&self, relation: RelationId, as_source: bool) -> StoreResult<RelationId> {
        let rel = self.txn.store().inner.model.require_relation(relation)?;
        let (end, side) = if as_source {
            (rel.source, "starts")
        } else {
            (rel.target, "ends")
        };
        if end != self.entity.id() {
            return Err(StoreError::illegal_argument(format!(
                "{relation} {side} at {end}, not at {}",
                self.entity.id()
            )));
        }
        Ok(rel.id)
    }

    /// Links `source_id` (of this entity type) to `target_id`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::IllegalArgument`] for an unknown relation, one not
    ///   starting at this entity type, or a zero id
    /// - [`StoreError::IllegalState`] outside a write transaction
    /// - [`StoreError::DbFull`] when a new link would exceed the size limit
    pub fn rel_put(
        &mut self,
        relation: RelationId,
        source_id: u64,
        target_id: u64,
    ) -> StoreResult<()> {
        let relation = self.relation_from_here(relation)?;
        if source_id == 0 || target_id == 0 {
            return Err(StoreError::illegal_argument("relation ids must not be zero"));
        }
        let max = self.txn.store().config().max_db_size_bytes();
        let snapshot = self.txn.snapshot_mut()?;
        let pair = (source_id, target_id);
        if snapshot.relation(relation).is_some_and(|pairs| pairs.contains(&pair)) {
            return Ok(());
        }
        let size = snapshot.size() + RELATION_PAIR_SIZE;
        if size > max {
            return Err(StoreError::DbFull { size, max });
        }
        snapshot.relation_mut(relation).insert(pair);
        Ok(())
    }

    /// Unlinks `source_id` from `target_id`. Returns whether the link existed.
    ///
    /// # Errors
    ///
    /// Same as [`Cursor::rel_put`].
    pub fn rel_remove(
        &mut self,
        relation: RelationId,
        source_id: u64,
        target_id: u64,
    ) -> StoreResult<bool> {
        let relation = self.relation_from_here(relation)?;
        let exists = self
            .txn
            .snapshot()?
            .relation(relation)
            .is_some_and(|pairs| pairs.contains(&(source_id, target_id)));
        if exists {
            self.txn
                .snapshot_mut()?
                .relation_mut(relation)
                .remove(&(source_id, target_id));
        } else {
            self.txn.snapshot_mut()?;
        }
        Ok(exists)
    }

    /// Target ids linked from `source_id`, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown relation or one
    /// not starting at this entity type.
    pub fn rel_ids(&self, relation: RelationId, source_id: u64) -> StoreResult<Vec<u64>> {
        let relation = self.relation_from_here(relation)?;
        Ok(self
            .txn
            .snapshot()?
            .relation(relation)
            .map(|pairs| targets_of(pairs, source_id))
            .unwrap_or_default())
    }

    /// Source ids linking to `target_id`, ascending. The cursor must be on
    /// the relation's target entity type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IllegalArgument`] for an unknown relation or one
    /// not ending at this entity type.
    pub fn rel_backlink_ids(&self, relation: RelationId, target_id: u64) -> StoreResult<Vec<u64>> {
        let relation = self.relation_at(relation, false)?;
        Ok(self
            .txn
            .snapshot()?
            .relation(relation)
            .map(|pairs| {
                pairs
                    .iter()
                    .filter(|(_, target)| *target == target_id)
                    .map(|(source, _)| *source)
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn targets_of(pairs: &RelationPairs, source_id: u64) -> Vec<u64> {
    pairs
        .range((source_id, 0)..=(source_id, u64::MAX))
        .map(|(_, target)| *target)
        .collect()
}

impl std::fmt::Debug for Cursor<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("entity", &self.entity.name())
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Model;
    use crate::store::Store;
    use crate::StoreConfig;
    use flatrec_codec::{FieldDef, Record, TableSchema};

    static NOTE_FIELDS: [FieldDef; 3] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::string(1, "text"),
        FieldDef::scalar(2, "authorId", ScalarType::UInt64),
    ];
    static NOTE: TableSchema = TableSchema::new("Note", &NOTE_FIELDS);

    static PERSON_FIELDS: [FieldDef; 2] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::string(1, "name"),
    ];
    static PERSON: TableSchema = TableSchema::new("Person", &PERSON_FIELDS);

    struct Fixture {
        store: Store,
        note: EntityTypeId,
        person: EntityTypeId,
        readers: RelationId,
    }

    fn fixture(config: StoreConfig) -> Fixture {
        let mut model = Model::new();
        let note = model.add_entity(&NOTE, 0).unwrap();
        let person = model.add_entity(&PERSON, 0).unwrap();
        let readers = model.add_relation("readers", note, person).unwrap();
        Fixture {
            store: Store::open(model, config).unwrap(),
            note,
            person,
            readers,
        }
    }

    fn note(id: u64, text: &str, author: u64) -> Vec<u8> {
        Record::new()
            .with(0, id)
            .with(1, text)
            .with(2, author)
            .to_bytes(&NOTE)
            .unwrap()
    }

    fn text_of(bytes: &[u8]) -> String {
        let table = flatrec_codec::root(bytes, &NOTE).unwrap();
        table.string(1).unwrap().unwrap_or_default().to_string()
    }

    fn fill(fx: &Fixture, notes: &[(u64, &str, u64)]) {
        fx.store
            .write(|txn| {
                let mut cursor = txn.cursor(fx.note)?;
                for (id, text, author) in notes {
                    cursor.put(*id, note(*id, text, *author), PutMode::Put)?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn id_sequence() {
        let fx = fixture(StoreConfig::new());
        let mut txn = fx.store.begin_write().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();
        assert_eq!(cursor.id_for_put(0).unwrap(), 1);
        assert_eq!(cursor.id_for_put(0).unwrap(), 2);
        assert_eq!(cursor.id_for_put(10).unwrap(), 10);
        assert_eq!(cursor.id_for_put(0).unwrap(), 11);
        assert_eq!(cursor.id_for_put(5).unwrap(), 5);
        assert_eq!(cursor.id_for_put(0).unwrap(), 12);
    }

    #[test]
    fn put_sets_sequence_past_explicit_ids() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(40, "a", 0)]);
        let id = fx
            .store
            .write(|txn| txn.cursor(fx.note)?.id_for_put(0))
            .unwrap();
        assert_eq!(id, 41);
    }

    #[test]
    fn put_validates_input() {
        let fx = fixture(StoreConfig::new());
        let mut txn = fx.store.begin_write().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();

        let err = cursor.put(0, note(0, "x", 0), PutMode::Put).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_ILLEGAL_ARGUMENT);

        let err = cursor.put(2, note(1, "x", 0), PutMode::Put).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_ILLEGAL_ARGUMENT);

        let mut broken = note(3, "x", 0);
        broken.truncate(broken.len() - 6);
        let err = cursor.put(3, broken, PutMode::Put).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_FILE_CORRUPT);

        assert_eq!(cursor.count().unwrap(), 0);
    }

    #[test]
    fn insert_refuses_existing_id() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(1, "first", 0)]);
        let mut txn = fx.store.begin_write().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();
        let err = cursor
            .put(1, note(1, "second", 0), PutMode::Insert)
            .unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolated { id: 1, .. }));

        cursor.put(1, note(1, "second", 0), PutMode::Put).unwrap();
        assert_eq!(text_of(&cursor.get(1).unwrap().unwrap()), "second");
    }

    #[test]
    fn iteration_follows_id_order() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(3, "c", 0), (1, "a", 0), (2, "b", 0)]);

        let mut txn = fx.store.begin_read().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();
        assert!(cursor.current().unwrap().is_none());

        let mut seen = Vec::new();
        let mut next = cursor.first().unwrap();
        while let Some(bytes) = next {
            seen.push(text_of(&bytes));
            next = cursor.next().unwrap();
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(cursor.id(), Some(3));

        assert!(cursor.seek(2).unwrap());
        assert_eq!(text_of(&cursor.current().unwrap().unwrap()), "b");
        assert_eq!(text_of(&cursor.next().unwrap().unwrap()), "c");
        assert!(!cursor.seek(9).unwrap());
        assert_eq!(cursor.id(), Some(3));

        assert_eq!(cursor.get_all().unwrap().len(), 3);
        assert!(cursor.get(9).unwrap().is_none());
    }

    #[test]
    fn counting() {
        let fx = fixture(StoreConfig::new());
        let mut txn = fx.store.begin_read().unwrap();
        assert!(txn.cursor(fx.note).unwrap().is_empty().unwrap());
        drop(txn);

        fill(&fx, &[(1, "a", 0), (2, "b", 0), (3, "c", 0)]);
        let mut txn = fx.store.begin_read().unwrap();
        let cursor = txn.cursor(fx.note).unwrap();
        assert_eq!(cursor.count().unwrap(), 3);
        assert_eq!(cursor.count_max(2).unwrap(), 2);
        assert_eq!(cursor.count_max(0).unwrap(), 3);
        assert!(!cursor.is_empty().unwrap());
    }

    #[test]
    fn remove_and_remove_all() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(1, "a", 0), (2, "b", 0), (3, "c", 0)]);

        let mut txn = fx.store.begin_write().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();
        assert!(cursor.remove(2).unwrap());
        assert!(!cursor.remove(2).unwrap());
        assert_eq!(cursor.count().unwrap(), 2);
        assert_eq!(cursor.remove_all().unwrap(), 2);
        assert_eq!(cursor.id_for_put(0).unwrap(), 4);
        txn.commit().unwrap();
        assert_eq!(fx.store.size(), 0);
    }

    #[test]
    fn size_limit() {
        let fx = fixture(StoreConfig::new().max_db_size_kb(1));
        let long = "x".repeat(2000);
        let err = fx
            .store
            .write(|txn| txn.cursor(fx.note)?.put(1, note(1, &long, 0), PutMode::Put))
            .unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_DB_FULL);
        fill(&fx, &[(1, "short", 0)]);
    }

    #[test]
    fn relation_links_count_against_the_size_limit() {
        let fx = fixture(StoreConfig::new().max_db_size_kb(1));
        fill(&fx, &[(1, "a", 0)]);

        let mut txn = fx.store.begin_write().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();
        let mut linked = 0u64;
        let err = loop {
            match cursor.rel_put(fx.readers, 1, linked + 1) {
                Ok(()) => linked += 1,
                Err(err) => break err,
            }
            assert!(linked < 100, "size limit never reached");
        };
        assert_eq!(err.code(), StoreError::CODE_DB_FULL);
        assert!(linked > 0);
        // Existing links can be put again at the limit.
        cursor.rel_put(fx.readers, 1, 1).unwrap();
        assert_eq!(cursor.rel_ids(fx.readers, 1).unwrap().len() as u64, linked);
        txn.commit().unwrap();
        assert!(fx.store.size() <= fx.store.config().max_db_size_bytes());
    }

    #[test]
    fn backlinks_through_to_one_property() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(1, "a", 7), (2, "b", 8), (3, "c", 7)]);

        let mut txn = fx.store.begin_read().unwrap();
        let cursor = txn.cursor(fx.person).unwrap();
        assert_eq!(cursor.backlink_ids(fx.note, 2, 7).unwrap(), vec![1, 3]);
        assert!(cursor.backlink_ids(fx.note, 2, 9).unwrap().is_empty());

        let err = cursor.backlink_ids(fx.note, 1, 7).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_PROPERTY_TYPE_MISMATCH);
        let err = cursor.backlink_ids(fx.note, 9, 7).unwrap_err();
        assert_eq!(err.code(), StoreError::CODE_ILLEGAL_ARGUMENT);
    }

    #[test]
    fn standalone_relations() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(1, "a", 0), (2, "b", 0)]);

        let mut txn = fx.store.begin_write().unwrap();
        let mut cursor = txn.cursor(fx.note).unwrap();
        cursor.rel_put(fx.readers, 1, 10).unwrap();
        cursor.rel_put(fx.readers, 1, 11).unwrap();
        cursor.rel_put(fx.readers, 2, 10).unwrap();
        assert_eq!(cursor.rel_ids(fx.readers, 1).unwrap(), vec![10, 11]);
        assert!(cursor.rel_remove(fx.readers, 1, 11).unwrap());
        assert!(!cursor.rel_remove(fx.readers, 1, 11).unwrap());
        assert!(cursor.rel_put(fx.readers, 0, 1).is_err());

        cursor.remove(1).unwrap();
        assert!(cursor.rel_ids(fx.readers, 1).unwrap().is_empty());
        txn.commit().unwrap();

        let mut txn = fx.store.begin_read().unwrap();
        let people = txn.cursor(fx.person).unwrap();
        assert_eq!(people.rel_backlink_ids(fx.readers, 10).unwrap(), vec![2]);
        assert!(people.rel_ids(fx.readers, 2).is_err());
    }

    #[test]
    fn buffers_outlive_the_transaction() {
        let fx = fixture(StoreConfig::new());
        fill(&fx, &[(1, "kept", 0)]);
        let bytes = fx
            .store
            .read(|txn| txn.cursor(fx.note)?.get(1))
            .unwrap()
            .unwrap();
        fill(&fx, &[(1, "replaced", 0)]);
        assert_eq!(text_of(&bytes), "kept");
    }
}
