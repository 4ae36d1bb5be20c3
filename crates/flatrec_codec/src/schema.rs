//! Table schema descriptors.
//!
//! A [`TableSchema`] is an ordered list of [`FieldDef`]s. The position of a
//! field in that list is its index, and the index is also its vtable slot on
//! the wire. Schemas evolve append-only: new fields get new trailing indices,
//! old indices are never reused or retyped.
//!
//! Schemas can be declared statically (see [`crate::define_table!`]) or
//! loaded at run time from JSON.

use crate::error::{CodecError, CodecResult};
use crate::scalar::{ScalarType, ScalarValue};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

/// Maximum nesting depth accepted when walking nested table schemas.
pub const MAX_SCHEMA_DEPTH: usize = 64;

/// What a field stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A fixed-width value stored inline in the table.
    Scalar(ScalarType),
    /// A UTF-8 string stored out of line.
    String,
    /// A vector of scalars stored out of line.
    Vector(ScalarType),
    /// A nested table stored out of line.
    Table(Cow<'static, TableSchema>),
}

impl FieldKind {
    /// Returns true if the field holds an offset to another object.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        !matches!(self, FieldKind::Scalar(_))
    }

    /// Bytes taken by the field inside the table.
    #[must_use]
    pub const fn inline_size(&self) -> usize {
        match self {
            FieldKind::Scalar(ty) => ty.size(),
            _ => 4,
        }
    }

    /// Short description used in error messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            FieldKind::Scalar(ty) => ty.name().to_string(),
            FieldKind::String => "string".to_string(),
            FieldKind::Vector(ty) => format!("[{ty}]"),
            FieldKind::Table(schema) => format!("table {}", schema.name),
        }
    }

    /// Compares kinds structurally, descending into nested tables.
    fn wire_compatible(&self, older: &FieldKind, depth: usize) -> bool {
        match (self, older) {
            (FieldKind::Scalar(a), FieldKind::Scalar(b)) => a == b,
            (FieldKind::String, FieldKind::String) => true,
            (FieldKind::Vector(a), FieldKind::Vector(b)) => a == b,
            (FieldKind::Table(a), FieldKind::Table(b)) => {
                depth < MAX_SCHEMA_DEPTH && a.check_evolution_at(b, depth + 1).is_ok()
            }
            _ => false,
        }
    }
}

/// Describes one field of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Stable index of the field; equals its position in the schema.
    pub id: u16,
    /// Field name. Not stored on the wire.
    pub name: Cow<'static, str>,
    /// What the field stores.
    pub kind: FieldKind,
    /// Default for scalar fields; `None` means the zero of the type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ScalarValue>,
    /// The field must be added before the table ends.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    /// The field is kept for layout only and should no longer be written.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
}

impl FieldDef {
    const fn with_kind(id: u16, name: &'static str, kind: FieldKind) -> Self {
        Self {
            id,
            name: Cow::Borrowed(name),
            kind,
            default: None,
            required: false,
            deprecated: false,
        }
    }

    /// A scalar field.
    #[must_use]
    pub const fn scalar(id: u16, name: &'static str, ty: ScalarType) -> Self {
        Self::with_kind(id, name, FieldKind::Scalar(ty))
    }

    /// A string field.
    #[must_use]
    pub const fn string(id: u16, name: &'static str) -> Self {
        Self::with_kind(id, name, FieldKind::String)
    }

    /// A vector-of-scalars field.
    #[must_use]
    pub const fn vector(id: u16, name: &'static str, element: ScalarType) -> Self {
        Self::with_kind(id, name, FieldKind::Vector(element))
    }

    /// A nested table field.
    #[must_use]
    pub const fn table(id: u16, name: &'static str, schema: &'static TableSchema) -> Self {
        Self::with_kind(id, name, FieldKind::Table(Cow::Borrowed(schema)))
    }

    /// Sets the default value of a scalar field.
    #[must_use]
    pub const fn with_default(mut self, value: ScalarValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Marks the field as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as deprecated.
    #[must_use]
    pub const fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// The effective default of a scalar field.
    ///
    /// Returns `None` for reference fields, which default to absent.
    #[must_use]
    pub fn default_value(&self) -> Option<ScalarValue> {
        match self.kind {
            FieldKind::Scalar(ty) => Some(self.default.unwrap_or(ty.zero())),
            _ => None,
        }
    }

    /// Byte offset of this field's slot inside a vtable.
    #[must_use]
    pub const fn vtable_slot(&self) -> usize {
        vtable_slot(self.id)
    }
}

/// Byte offset of the vtable slot for field `id`.
#[must_use]
pub const fn vtable_slot(id: u16) -> usize {
    4 + 2 * id as usize
}

/// A table schema: name, optional buffer identifier and ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: Cow<'static, str>,
    /// Four-byte buffer identifier checked when this table is a root.
    #[serde(default, with = "identifier_serde")]
    pub identifier: Option<[u8; 4]>,
    /// Fields ordered by index.
    pub fields: Cow<'static, [FieldDef]>,
}

impl TableSchema {
    /// Creates a schema from static parts.
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [FieldDef]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            identifier: None,
            fields: Cow::Borrowed(fields),
        }
    }

    /// Creates a schema from owned parts.
    #[must_use]
    pub fn owned(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            identifier: None,
            fields: Cow::Owned(fields),
        }
    }

    /// Sets the buffer identifier.
    #[must_use]
    pub const fn with_identifier(mut self, identifier: [u8; 4]) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Number of declared fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Looks up a field by index.
    #[must_use]
    pub fn field(&self, id: u16) -> Option<&FieldDef> {
        self.fields.get(usize::from(id))
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field, failing with a schema mismatch if it does not exist.
    pub fn expect_field(&self, id: u16) -> CodecResult<&FieldDef> {
        self.field(id).ok_or_else(|| {
            CodecError::schema_mismatch(format!("table {} has no field {id}", self.name))
        })
    }

    /// Iterates over the fields that must be present.
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Effective default of scalar field `id`.
    #[must_use]
    pub fn default_of(&self, id: u16) -> Option<ScalarValue> {
        self.field(id).and_then(FieldDef::default_value)
    }

    /// Checks the schema for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSchema`] if indices are not dense and
    /// ordered, names repeat, a default does not match its field type, or a
    /// scalar field is marked required.
    pub fn validate(&self) -> CodecResult<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> CodecResult<()> {
        if depth > MAX_SCHEMA_DEPTH {
            return Err(CodecError::invalid_schema(format!(
                "table {} nests deeper than {MAX_SCHEMA_DEPTH} levels",
                self.name
            )));
        }
        if self.fields.len() > usize::from(u16::MAX) {
            return Err(CodecError::invalid_schema(format!(
                "table {} declares too many fields",
                self.name
            )));
        }

        let mut names = HashSet::new();
        for (position, field) in self.fields.iter().enumerate() {
            if usize::from(field.id) != position {
                return Err(CodecError::invalid_schema(format!(
                    "field {} of table {} has index {} but is declared at position {position}",
                    field.name, self.name, field.id
                )));
            }
            if !names.insert(field.name.as_ref()) {
                return Err(CodecError::invalid_schema(format!(
                    "duplicate field name {} in table {}",
                    field.name, self.name
                )));
            }
            match (&field.kind, field.default) {
                (FieldKind::Scalar(ty), Some(default)) if default.scalar_type() != *ty => {
                    return Err(CodecError::invalid_schema(format!(
                        "default of field {} is {} but the field is {ty}",
                        field.name,
                        default.scalar_type()
                    )));
                }
                (kind, Some(_)) if kind.is_reference() => {
                    return Err(CodecError::invalid_schema(format!(
                        "reference field {} cannot have a scalar default",
                        field.name
                    )));
                }
                _ => {}
            }
            if field.required && !field.kind.is_reference() {
                return Err(CodecError::invalid_schema(format!(
                    "scalar field {} cannot be required",
                    field.name
                )));
            }
            if let FieldKind::Table(nested) = &field.kind {
                nested.validate_at(depth + 1)?;
            }
        }
        Ok(())
    }

    /// Checks that `self` is a valid append-only evolution of `older`.
    ///
    /// Every field of `older` must keep its index, wire kind and default.
    /// Fields may be renamed or deprecated; new fields may only be appended.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSchema`] describing the first violation.
    pub fn check_evolution(&self, older: &TableSchema) -> CodecResult<()> {
        self.check_evolution_at(older, 0)
    }

    fn check_evolution_at(&self, older: &TableSchema, depth: usize) -> CodecResult<()> {
        if self.fields.len() < older.fields.len() {
            return Err(CodecError::invalid_schema(format!(
                "table {} dropped fields: {} declared, {} before",
                self.name,
                self.fields.len(),
                older.fields.len()
            )));
        }
        for old in older.fields.iter() {
            let Some(new) = self.field(old.id) else {
                continue;
            };
            if !new.kind.wire_compatible(&old.kind, depth) {
                return Err(CodecError::invalid_schema(format!(
                    "field {} changed kind from {} to {}",
                    old.id,
                    old.kind.describe(),
                    new.kind.describe()
                )));
            }
            let same_default = match (new.default_value(), old.default_value()) {
                (Some(a), Some(b)) => a.same_bits(&b),
                (None, None) => true,
                _ => false,
            };
            if !same_default {
                return Err(CodecError::invalid_schema(format!(
                    "field {} changed its default value",
                    old.id
                )));
            }
            if new.required && !old.required {
                return Err(CodecError::invalid_schema(format!(
                    "field {} became required",
                    old.id
                )));
            }
        }
        Ok(())
    }

    /// Returns a schema restricted to the first `count` fields.
    ///
    /// Models a reader compiled against an earlier version of this schema.
    #[must_use]
    pub fn truncated(&self, count: usize) -> TableSchema {
        let count = count.min(self.fields.len());
        TableSchema {
            name: self.name.clone(),
            identifier: self.identifier,
            fields: Cow::Owned(self.fields[..count].to_vec()),
        }
    }
}

mod identifier_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<[u8; 4]>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&String::from_utf8_lossy(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; 4]>, D::Error> {
        let Some(text) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let bytes: [u8; 4] = text
            .as_bytes()
            .try_into()
            .map_err(|_| D::Error::custom("identifier must be exactly 4 bytes"))?;
        Ok(Some(bytes))
    }
}
