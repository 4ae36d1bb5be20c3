//! # FlatRec Codec
//!
//! Schema-driven, zero-copy binary records.
//!
//! A record is written once by a [`Builder`] into a compact little-endian
//! buffer and then read in place by a [`Table`] view, without parsing or
//! copying. Every table carries a small offset table (the vtable) that says
//! which fields are present and where they live, which gives:
//!
//! - Forward compatibility: readers ignore fields newer than their schema
//! - Backward compatibility: fields missing from older buffers read as defaults
//! - Compactness: scalars equal to their default are not written at all
//!
//! ## Layout
//!
//! - Buffer: root `u32` offset, then an optional 4-byte identifier
//! - Table: `i32` back-offset to its vtable, then inline fields
//! - Vtable: `u16` vtable size, `u16` table size, one `u16` per field
//! - String: `u32` length, UTF-8 bytes, zero terminator
//! - Vector: `u32` count, elements aligned to their own size
//!
//! ## Usage
//!
//! ```
//! use flatrec_codec::{root, Builder, FieldDef, ScalarType, TableSchema};
//!
//! static FIELDS: [FieldDef; 3] = [
//!     FieldDef::scalar(0, "id", ScalarType::UInt64),
//!     FieldDef::scalar(1, "timestamp", ScalarType::UInt64),
//!     FieldDef::vector(2, "payload", ScalarType::Int8),
//! ];
//! static EVENT: TableSchema = TableSchema::new("Event", &FIELDS);
//!
//! let mut builder = Builder::new();
//! let payload = builder.create_vector(&[1i8, 2, 3]).unwrap();
//! builder.start_table(&EVENT);
//! builder.add_scalar(0, 42u64).unwrap();
//! builder.add_scalar(1, 1000u64).unwrap();
//! builder.add_reference(2, payload).unwrap();
//! let event = builder.end_table().unwrap();
//! builder.finish(event).unwrap();
//!
//! let table = root(builder.finished_data(), &EVENT).unwrap();
//! assert_eq!(table.get::<u64>(0).unwrap(), 42);
//! assert_eq!(table.vector::<i8>(2).unwrap().unwrap().to_vec(), vec![1, 2, 3]);
//! ```
//!
//! For statically known schemas, [`define_table!`] generates typed records
//! and readers on top of the same engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod error;
mod macros;
mod reader;
mod scalar;
mod schema;
mod value;

pub use builder::{Builder, Ref, RefKind, MAX_BUFFER_SIZE};
pub use error::{CodecError, CodecResult};
pub use reader::{
    buffer_identifier, has_identifier, root, root_unchecked_identifier, verify, RawVector, Table,
    Vector,
};
pub use scalar::{Scalar, ScalarType, ScalarValue};
pub use schema::{vtable_slot, FieldDef, FieldKind, TableSchema, MAX_SCHEMA_DEPTH};
pub use value::{Record, Value};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// A Rust type that is written and read as one table.
///
/// Implemented by the `Record` types generated with [`define_table!`].
pub trait TableRecord: Sized {
    /// The table schema.
    fn schema() -> &'static TableSchema;

    /// Writes `self` as a table.
    ///
    /// # Errors
    ///
    /// Returns any builder error.
    fn build(&self, builder: &mut Builder<'_>) -> CodecResult<Ref>;

    /// Reads a value from a table of [`TableRecord::schema`].
    ///
    /// # Errors
    ///
    /// Returns any read error.
    fn read(table: Table<'_>) -> CodecResult<Self>;

    /// Writes `self` into a new finished buffer, tagged with the schema
    /// identifier when there is one.
    ///
    /// # Errors
    ///
    /// Returns any builder error.
    fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut builder = Builder::new();
        let table = self.build(&mut builder)?;
        builder.finish_root(table, Self::schema())?;
        Ok(builder.into_bytes())
    }

    /// Reads a value from a finished buffer.
    ///
    /// # Errors
    ///
    /// Returns any read error.
    fn from_bytes(buf: &[u8]) -> CodecResult<Self> {
        Self::read(root(buf, Self::schema())?)
    }
}

/// A table record with a `u64` identity field, as stored by an object store.
///
/// An id of zero means "not yet assigned".
pub trait Entity: TableRecord {
    /// Index of the id field.
    const ID_FIELD: u16;

    /// The current id.
    fn entity_id(&self) -> u64;

    /// Replaces the id, typically after the store assigned one.
    fn set_entity_id(&mut self, id: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    static FIELDS: [FieldDef; 3] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::scalar(1, "timestamp", ScalarType::UInt64),
        FieldDef::vector(2, "userData", ScalarType::Int8),
    ];
    static DEMO: TableSchema = TableSchema::new("CompressionDemoEntity", &FIELDS);

    fn build(id: u64, timestamp: u64, data: &[i8]) -> Vec<u8> {
        let mut builder = Builder::new();
        let data = builder.create_vector(data).unwrap();
        builder.start_table(&DEMO);
        builder.add_scalar(0, id).unwrap();
        builder.add_scalar(1, timestamp).unwrap();
        builder.add_reference(2, data).unwrap();
        let table = builder.end_table().unwrap();
        builder.finish(table).unwrap();
        builder.into_bytes()
    }

    #[test]
    fn demo_entity_reads_back() {
        let buf = build(42, 1000, &[1, 2, 3]);
        let table = root(&buf, &DEMO).unwrap();
        assert_eq!(table.get::<u64>(0).unwrap(), 42);
        assert_eq!(table.get::<u64>(1).unwrap(), 1000);
        assert_eq!(table.vector::<i8>(2).unwrap().unwrap().to_vec(), vec![1, 2, 3]);
        verify(&buf, &DEMO).unwrap();
    }

    #[test]
    fn zero_timestamp_is_absent_but_empty_vector_is_not() {
        let buf = build(42, 0, &[]);
        let table = root(&buf, &DEMO).unwrap();
        assert!(!table.is_present(1));
        assert_eq!(table.get::<u64>(1).unwrap(), 0);
        let data = table.vector::<i8>(2).unwrap().unwrap();
        assert!(data.is_empty());
        assert!(buf.len() < build(42, 1000, &[1, 2, 3]).len());
    }

    #[test]
    fn all_defaults_leave_no_slots() {
        let mut builder = Builder::new();
        builder.start_table(&DEMO);
        builder.add_scalar(0, 0u64).unwrap();
        builder.add_scalar(1, 0u64).unwrap();
        let table = builder.end_table().unwrap();
        builder.finish(table).unwrap();
        let table = root(builder.finished_data(), &DEMO).unwrap();
        assert!(table.slots().all(|slot| slot == 0));
        assert_eq!(table.get::<u64>(0).unwrap(), 0);
    }
}
