//! Immutable store state shared between transactions.
//!
//! Readers hold an `Arc<Snapshot>`. A write transaction clones the snapshot
//! (cheap: one `Arc` per entity type) and copies an entity's data the first
//! time it modifies it.

use crate::types::{EntityTypeId, RelationId};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Bytes accounted per stored key.
pub(crate) const KEY_OVERHEAD: u64 = 8;

/// Bytes accounted per relation pair.
pub(crate) const RELATION_PAIR_SIZE: u64 = 16;

/// Objects of one entity type, keyed by id.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntityData {
    pub(crate) objects: BTreeMap<u64, Bytes>,
    /// Highest id handed out or stored.
    pub(crate) last_id: u64,
    /// Accounted size of `objects`.
    pub(crate) size: u64,
}

impl EntityData {
    pub(crate) fn insert(&mut self, id: u64, data: Bytes) -> Option<Bytes> {
        self.size += data.len() as u64 + KEY_OVERHEAD;
        self.last_id = self.last_id.max(id);
        let previous = self.objects.insert(id, data);
        if let Some(old) = &previous {
            self.size -= old.len() as u64 + KEY_OVERHEAD;
        }
        previous
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Bytes> {
        let removed = self.objects.remove(&id);
        if let Some(old) = &removed {
            self.size -= old.len() as u64 + KEY_OVERHEAD;
        }
        removed
    }
}

/// Source/target id pairs of one relation.
pub(crate) type RelationPairs = BTreeSet<(u64, u64)>;

/// The full store state at one point in time.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub(crate) entities: BTreeMap<EntityTypeId, Arc<EntityData>>,
    pub(crate) relations: BTreeMap<RelationId, Arc<RelationPairs>>,
}

impl Snapshot {
    pub(crate) fn entity(&self, id: EntityTypeId) -> Option<&EntityData> {
        self.entities.get(&id).map(Arc::as_ref)
    }

    pub(crate) fn entity_mut(&mut self, id: EntityTypeId) -> &mut EntityData {
        Arc::make_mut(self.entities.entry(id).or_default())
    }

    pub(crate) fn relation(&self, id: RelationId) -> Option<&RelationPairs> {
        self.relations.get(&id).map(Arc::as_ref)
    }

    pub(crate) fn relation_mut(&mut self, id: RelationId) -> &mut RelationPairs {
        Arc::make_mut(self.relations.entry(id).or_default())
    }

    /// Accounted size of everything stored.
    pub(crate) fn size(&self) -> u64 {
        let objects: u64 = self.entities.values().map(|data| data.size).sum();
        let pairs: u64 = self
            .relations
            .values()
            .map(|pairs| pairs.len() as u64 * RELATION_PAIR_SIZE)
            .sum();
        objects + pairs
    }
}
