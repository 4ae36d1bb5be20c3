//! The data model: which entity types and relations a store holds.

use crate::error::{StoreError, StoreResult};
use crate::types::{EntityTypeId, RelationId};
use flatrec_codec::{Entity, FieldKind, ScalarType, TableSchema};
use std::borrow::Cow;

/// A registered entity type.
#[derive(Debug, Clone)]
pub struct EntityType {
    id: EntityTypeId,
    schema: Cow<'static, TableSchema>,
    id_field: u16,
}

impl EntityType {
    /// Entity type ID.
    #[must_use]
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    /// Entity name, taken from the schema.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// The table schema objects of this type are written with.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Index of the `u64` id field.
    #[must_use]
    pub fn id_field(&self) -> u16 {
        self.id_field
    }

    /// Looks up a property index by name.
    #[must_use]
    pub fn property_id(&self, name: &str) -> Option<u16> {
        self.schema.field_by_name(name).map(|field| field.id)
    }

    /// Property name for error messages.
    pub(crate) fn property_name(&self, property: u16) -> String {
        self.schema.field(property).map_or_else(
            || format!("{}.#{property}", self.name()),
            |field| format!("{}.{}", self.name(), field.name),
        )
    }
}

/// A standalone many-to-many relation between two entity types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Relation ID.
    pub id: RelationId,
    /// Relation name, unique within the model.
    pub name: String,
    /// Entity type relations start from.
    pub source: EntityTypeId,
    /// Entity type relations point to.
    pub target: EntityTypeId,
}

/// Entity types and relations known to a store.
///
/// IDs are assigned from 1 in registration order.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: Vec<EntityType>,
    relations: Vec<Relation>,
}

impl Model {
    /// Creates an empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type with a static schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] if the schema is invalid, the name is
    /// taken, or `id_field` is not a `u64` scalar.
    pub fn add_entity(
        &mut self,
        schema: &'static TableSchema,
        id_field: u16,
    ) -> StoreResult<EntityTypeId> {
        self.insert_entity(Cow::Borrowed(schema), id_field)
    }

    /// Registers an entity type with a schema built at run time.
    ///
    /// # Errors
    ///
    /// Same as [`Model::add_entity`].
    pub fn add_owned_entity(
        &mut self,
        schema: TableSchema,
        id_field: u16,
    ) -> StoreResult<EntityTypeId> {
        self.insert_entity(Cow::Owned(schema), id_field)
    }

    /// Registers the entity type of a generated record.
    ///
    /// # Errors
    ///
    /// Same as [`Model::add_entity`].
    pub fn add_entity_of<T: Entity>(&mut self) -> StoreResult<EntityTypeId> {
        self.add_entity(T::schema(), T::ID_FIELD)
    }

    fn insert_entity(
        &mut self,
        schema: Cow<'static, TableSchema>,
        id_field: u16,
    ) -> StoreResult<EntityTypeId> {
        schema.validate()?;
        if self.entity_id(&schema.name).is_some() {
            return Err(StoreError::schema(format!(
                "entity {} is already registered",
                schema.name
            )));
        }
        match schema.field(id_field).map(|field| &field.kind) {
            Some(FieldKind::Scalar(ScalarType::UInt64)) => {}
            Some(kind) => {
                return Err(StoreError::schema(format!(
                    "id field {id_field} of {} must be u64, found {}",
                    schema.name,
                    kind.describe()
                )))
            }
            None => {
                return Err(StoreError::schema(format!(
                    "entity {} has no field {id_field} to use as id",
                    schema.name
                )))
            }
        }

        let id = EntityTypeId::new(next_id(self.entities.len())?);
        self.entities.push(EntityType {
            id,
            schema,
            id_field,
        });
        Ok(id)
    }

    /// Registers a standalone relation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Schema`] if the name is taken or either entity
    /// type is unknown.
    pub fn add_relation(
        &mut self,
        name: impl Into<String>,
        source: EntityTypeId,
        target: EntityTypeId,
    ) -> StoreResult<RelationId> {
        let name = name.into();
        if self.relation_id(&name).is_some() {
            return Err(StoreError::schema(format!(
                "relation {name} is already registered"
            )));
        }
        for end in [source, target] {
            if self.entity(end).is_none() {
                return Err(StoreError::schema(format!(
                    "relation {name} refers to unknown {end}"
                )));
            }
        }

        let id = RelationId::new(next_id(self.relations.len())?);
        self.relations.push(Relation {
            id,
            name,
            source,
            target,
        });
        Ok(id)
    }

    /// All entity types in registration order.
    #[must_use]
    pub fn entities(&self) -> &[EntityType] {
        &self.entities
    }

    /// All relations in registration order.
    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Looks up an entity type.
    #[must_use]
    pub fn entity(&self, id: EntityTypeId) -> Option<&EntityType> {
        let index = usize::try_from(id.as_u32()).ok()?.checked_sub(1)?;
        self.entities.get(index)
    }

    /// Looks up an entity type ID by name.
    #[must_use]
    pub fn entity_id(&self, name: &str) -> Option<EntityTypeId> {
        self.entities
            .iter()
            .find(|entity| entity.name() == name)
            .map(EntityType::id)
    }

    /// Looks up a relation.
    #[must_use]
    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        let index = usize::try_from(id.as_u32()).ok()?.checked_sub(1)?;
        self.relations.get(index)
    }

    /// Looks up a relation ID by name.
    #[must_use]
    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        self.relations
            .iter()
            .find(|relation| relation.name == name)
            .map(|relation| relation.id)
    }

    /// Looks up an entity type, failing with `IllegalArgument`.
    pub(crate) fn require_entity(&self, id: EntityTypeId) -> StoreResult<&EntityType> {
        self.entity(id)
            .ok_or_else(|| StoreError::illegal_argument(format!("unknown {id}")))
    }

    /// Looks up a relation, failing with `IllegalArgument`.
    pub(crate) fn require_relation(&self, id: RelationId) -> StoreResult<&Relation> {
        self.relation(id)
            .ok_or_else(|| StoreError::illegal_argument(format!("unknown {id}")))
    }
}

fn next_id(count: usize) -> StoreResult<u32> {
    u32::try_from(count + 1).map_err(|_| StoreError::schema("too many model elements"))
}
