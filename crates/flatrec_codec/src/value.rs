//! Dynamically typed records.
//!
//! A [`Record`] is a sparse map from field index to [`Value`], interpreted
//! against a [`TableSchema`] at run time. It is what the CLI encodes from JSON
//! and what generic tooling decodes buffers into.

use crate::builder::{Builder, Ref};
use crate::error::{CodecError, CodecResult};
use crate::reader::{root, Table};
use crate::scalar::{Scalar, ScalarValue};
use crate::schema::{FieldKind, TableSchema};
use std::collections::BTreeMap;

/// The value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A scalar.
    Scalar(ScalarValue),
    /// A string.
    String(String),
    /// A vector of scalars, all of the field's element type.
    Vector(Vec<ScalarValue>),
    /// A nested table.
    Table(Record),
}

impl Value {
    /// The scalar, if this is one.
    #[must_use]
    pub fn as_scalar(&self) -> Option<ScalarValue> {
        match self {
            Value::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The vector elements, if this is a vector.
    #[must_use]
    pub fn as_vector(&self) -> Option<&[ScalarValue]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// The nested record, if this is a table.
    #[must_use]
    pub fn as_table(&self) -> Option<&Record> {
        match self {
            Value::Table(r) => Some(r),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::String(_) => "string",
            Value::Vector(_) => "vector",
            Value::Table(_) => "table",
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(value: ScalarValue) -> Self {
        Value::Scalar(value)
    }
}

impl<T: Scalar> From<T> for Value {
    fn from(value: T) -> Self {
        Value::Scalar(value.into_value())
    }
}

impl<T: Scalar> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Vector(values.into_iter().map(Scalar::into_value).collect())
    }
}

impl<T: Scalar> From<&[T]> for Value {
    fn from(values: &[T]) -> Self {
        Value::Vector(values.iter().map(|value| value.into_value()).collect())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Table(value)
    }
}

/// A sparse, schema-interpreted table value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<u16, Value>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets field `id`, builder style.
    #[must_use]
    pub fn with(mut self, id: u16, value: impl Into<Value>) -> Self {
        self.set(id, value);
        self
    }

    /// Sets field `id`.
    pub fn set(&mut self, id: u16, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(id, value.into());
        self
    }

    /// Value of field `id`.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&Value> {
        self.fields.get(&id)
    }

    /// Removes field `id`.
    pub fn remove(&mut self, id: u16) -> Option<Value> {
        self.fields.remove(&id)
    }

    /// Number of fields set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the set fields in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Value)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }

    /// Writes the record as a table of `schema`.
    ///
    /// Out-of-line values are created first, then the table is opened and all
    /// fields are staged.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SchemaMismatch`] when a value does not fit its
    /// field, plus the errors of [`Builder::end_table`].
    pub fn build<'s>(
        &self,
        builder: &mut Builder<'s>,
        schema: &'s TableSchema,
    ) -> CodecResult<Ref> {
        let mut references = Vec::new();
        for (&id, value) in &self.fields {
            let field = schema.expect_field(id)?;
            let reference = match (&field.kind, value) {
                (FieldKind::Scalar(_), Value::Scalar(_)) => continue,
                (FieldKind::String, Value::String(s)) => builder.create_string(s)?,
                (FieldKind::Vector(element), Value::Vector(values)) => {
                    builder.create_vector_values(*element, values)?
                }
                (FieldKind::Table(nested), Value::Table(record)) => record.build(builder, nested)?,
                (kind, value) => {
                    return Err(CodecError::schema_mismatch(format!(
                        "field {} of table {} is {}, got a {} value",
                        field.name,
                        schema.name,
                        kind.describe(),
                        value.describe()
                    )));
                }
            };
            references.push((id, reference));
        }

        builder.start_table(schema);
        let staged = (|| -> CodecResult<()> {
            for (&id, value) in &self.fields {
                if let Value::Scalar(scalar) = value {
                    builder.add_scalar_value(id, *scalar)?;
                }
            }
            for (id, reference) in &references {
                builder.add_reference(*id, *reference)?;
            }
            Ok(())
        })();
        match staged {
            Ok(()) => builder.end_table(),
            Err(err) => {
                builder.abandon_table();
                Err(err)
            }
        }
    }

    /// Builds a finished buffer holding this record as root.
    ///
    /// The schema identifier is written when the schema declares one.
    ///
    /// # Errors
    ///
    /// See [`Record::build`].
    pub fn to_bytes(&self, schema: &TableSchema) -> CodecResult<Vec<u8>> {
        let mut builder = Builder::new();
        let table = self.build(&mut builder, schema)?;
        builder.finish_root(table, schema)?;
        Ok(builder.into_bytes())
    }

    /// Decodes a finished buffer rooted at a table of `schema`.
    ///
    /// # Errors
    ///
    /// See [`root`] and [`Record::read`].
    pub fn from_bytes(buf: &[u8], schema: &TableSchema) -> CodecResult<Self> {
        Self::read(&root(buf, schema)?)
    }

    /// Decodes the fields of `table` known to its schema.
    ///
    /// Absent references and default-valued scalars are left unset, so the
    /// result equals the normalized form of whatever record was written.
    ///
    /// # Errors
    ///
    /// Returns the first read error.
    pub fn read(table: &Table<'_>) -> CodecResult<Self> {
        let schema = table.schema();
        let mut record = Record::new();
        for field in schema.fields.iter() {
            if !table.is_present(field.id) {
                continue;
            }
            let value = match &field.kind {
                FieldKind::Scalar(_) => {
                    let value = table.get_value(field.id)?;
                    if field
                        .default_value()
                        .is_some_and(|default| default.same_bits(&value))
                    {
                        continue;
                    }
                    Value::Scalar(value)
                }
                FieldKind::String => match table.string(field.id)? {
                    Some(s) => Value::String(s.to_string()),
                    None => continue,
                },
                FieldKind::Vector(_) => match table.raw_vector(field.id)? {
                    Some(v) => Value::Vector(v.iter().collect()),
                    None => continue,
                },
                FieldKind::Table(_) => match table.table(field.id)? {
                    Some(nested) => Value::Table(Record::read(&nested)?),
                    None => continue,
                },
            };
            record.fields.insert(field.id, value);
        }
        Ok(record)
    }

    /// Returns the record as a reader of `schema` would see it after a
    /// round trip: scalars equal to their default are dropped, recursively.
    #[must_use]
    pub fn normalized(&self, schema: &TableSchema) -> Record {
        let mut out = Record::new();
        for (&id, value) in &self.fields {
            let Some(field) = schema.field(id) else {
                continue;
            };
            let value = match (&field.kind, value) {
                (FieldKind::Scalar(_), Value::Scalar(v)) => {
                    if field
                        .default_value()
                        .is_some_and(|default| default.same_bits(v))
                    {
                        continue;
                    }
                    Value::Scalar(*v)
                }
                (FieldKind::Table(nested), Value::Table(record)) => {
                    Value::Table(record.normalized(nested))
                }
                (_, other) => other.clone(),
            };
            out.fields.insert(id, value);
        }
        out
    }

    /// Pairs each set field with its name in `schema`.
    pub fn named<'r>(
        &'r self,
        schema: &'r TableSchema,
    ) -> impl Iterator<Item = (&'r str, &'r Value)> + 'r {
        self.fields.iter().map(move |(id, value)| {
            let name = schema.field(*id).map_or("?", |f| f.name.as_ref());
            (name, value)
        })
    }
}
