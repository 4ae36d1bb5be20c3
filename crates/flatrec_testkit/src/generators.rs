//! Property-based test generators using proptest.
//!
//! Typed strategies produce records of the fixture schemas. Dynamic
//! strategies produce arbitrary flat schemas together with records that fit
//! them, for properties that must hold for every schema.

use crate::fixtures::{compression_demo, sample_child, sample_entity, test_entity};
use flatrec_codec::{FieldDef, FieldKind, Record, ScalarType, ScalarValue, TableSchema, Value};
use proptest::prelude::*;
use std::borrow::Cow;

/// Every scalar type.
pub const SCALAR_TYPES: [ScalarType; 11] = [
    ScalarType::Bool,
    ScalarType::Int8,
    ScalarType::UInt8,
    ScalarType::Int16,
    ScalarType::UInt16,
    ScalarType::Int32,
    ScalarType::UInt32,
    ScalarType::Int64,
    ScalarType::UInt64,
    ScalarType::Float32,
    ScalarType::Float64,
];

/// Strategy for any scalar type.
pub fn scalar_type_strategy() -> impl Strategy<Value = ScalarType> {
    prop::sample::select(SCALAR_TYPES.to_vec())
}

/// Strategy for values of `ty`. Floats are finite so records compare equal
/// after a round trip.
pub fn scalar_value_strategy(ty: ScalarType) -> BoxedStrategy<ScalarValue> {
    match ty {
        ScalarType::Bool => any::<bool>().prop_map(ScalarValue::Bool).boxed(),
        ScalarType::Int8 => any::<i8>().prop_map(ScalarValue::Int8).boxed(),
        ScalarType::UInt8 => any::<u8>().prop_map(ScalarValue::UInt8).boxed(),
        ScalarType::Int16 => any::<i16>().prop_map(ScalarValue::Int16).boxed(),
        ScalarType::UInt16 => any::<u16>().prop_map(ScalarValue::UInt16).boxed(),
        ScalarType::Int32 => any::<i32>().prop_map(ScalarValue::Int32).boxed(),
        ScalarType::UInt32 => any::<u32>().prop_map(ScalarValue::UInt32).boxed(),
        ScalarType::Int64 => any::<i64>().prop_map(ScalarValue::Int64).boxed(),
        ScalarType::UInt64 => any::<u64>().prop_map(ScalarValue::UInt64).boxed(),
        ScalarType::Float32 => (-1.0e6f32..1.0e6).prop_map(ScalarValue::Float32).boxed(),
        ScalarType::Float64 => (-1.0e12f64..1.0e12).prop_map(ScalarValue::Float64).boxed(),
    }
}

/// Strategy for compression demo records with an id already assigned.
pub fn compression_demo_strategy() -> impl Strategy<Value = compression_demo::Record> {
    (
        1u64..=u64::MAX,
        any::<u64>(),
        prop::option::of(prop::collection::vec(any::<i8>(), 0..64)),
    )
        .prop_map(|(id, timestamp, user_data)| compression_demo::Record {
            id,
            timestamp,
            user_data,
        })
}

fn sample_child_strategy() -> impl Strategy<Value = sample_child::Record> {
    (prop::option::of("[a-z]{0,12}"), any::<u16>())
        .prop_map(|(label, depth)| sample_child::Record { label, depth })
}

/// Strategy for store test entities.
pub fn test_entity_strategy() -> impl Strategy<Value = test_entity::Record> {
    let scalars = (
        any::<u64>(),
        any::<bool>(),
        any::<i8>(),
        any::<i16>(),
        any::<i32>(),
        any::<i64>(),
        -1.0e6f32..1.0e6,
        -1.0e12f64..1.0e12,
    );
    let rest = (
        prop::option::of("\\PC{0,24}"),
        prop::option::of(prop::collection::vec(any::<i8>(), 0..48)),
        any::<u64>(),
    );
    (scalars, rest).prop_map(|((id, boolean, byte, short, int, long, float, double), rest)| {
        let (string, byte_array, date) = rest;
        test_entity::Record {
            id,
            simple_boolean: boolean,
            simple_byte: byte,
            simple_short: short,
            simple_int: int,
            simple_long: long,
            simple_float: float,
            simple_double: double,
            simple_string: string,
            simple_byte_array: byte_array,
            simple_date: date,
        }
    })
}

/// Strategy for sample entities covering every field kind.
pub fn sample_entity_strategy() -> impl Strategy<Value = sample_entity::Record> {
    let scalars = (
        any::<u64>(),
        any::<bool>(),
        any::<i8>(),
        any::<i16>(),
        any::<u32>(),
        any::<i64>(),
        -1.0e6f32..1.0e6,
        -1.0e12f64..1.0e12,
    );
    let references = (
        prop::option::of("\\PC{0,24}"),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..48)),
        prop::option::of(prop::collection::vec(-1.0e9f64..1.0e9, 0..8)),
        prop::option::of(sample_child_strategy()),
    );
    (scalars, references).prop_map(
        |((id, flag, tiny, small, count, date, ratio, score), (name, data, samples, child))| {
            sample_entity::Record {
                id,
                flag,
                tiny,
                small,
                count,
                date,
                ratio,
                score,
                name,
                data,
                samples,
                child,
            }
        },
    )
}

fn field_strategy(id: u16) -> impl Strategy<Value = FieldDef> {
    let kind = prop_oneof![
        4 => scalar_type_strategy().prop_map(FieldKind::Scalar),
        1 => Just(FieldKind::String),
        2 => scalar_type_strategy().prop_map(FieldKind::Vector),
    ];
    (kind, any::<bool>())
        .prop_flat_map(move |(kind, custom_default)| {
            let default = match &kind {
                FieldKind::Scalar(ty) if custom_default => {
                    scalar_value_strategy(*ty).prop_map(Some).boxed()
                }
                _ => Just(None).boxed(),
            };
            (Just(kind), default)
        })
        .prop_map(move |(kind, default)| FieldDef {
            id,
            name: Cow::Owned(format!("f{id}")),
            kind,
            default,
            required: false,
            deprecated: false,
        })
}

/// Strategy for flat schemas of 1 to `max_fields` fields.
pub fn schema_strategy(max_fields: u16) -> impl Strategy<Value = TableSchema> {
    (1..=max_fields.max(1))
        .prop_flat_map(|count| (0..count).map(field_strategy).collect::<Vec<_>>())
        .prop_map(|fields| TableSchema::owned("Generated", fields))
}

fn value_strategy(kind: &FieldKind) -> BoxedStrategy<Value> {
    match kind {
        FieldKind::Scalar(ty) => scalar_value_strategy(*ty).prop_map(Value::Scalar).boxed(),
        FieldKind::String => "\\PC{0,16}".prop_map(Value::String).boxed(),
        FieldKind::Vector(ty) => prop::collection::vec(scalar_value_strategy(*ty), 0..12)
            .prop_map(Value::Vector)
            .boxed(),
        FieldKind::Table(_) => Just(Value::Table(Record::new())).boxed(),
    }
}

/// Strategy for records of `schema`, each field set or left unset at random.
pub fn record_strategy(schema: &TableSchema) -> impl Strategy<Value = Record> {
    let fields: Vec<_> = schema
        .fields
        .iter()
        .map(|field| {
            let id = field.id;
            prop::option::of(value_strategy(&field.kind).prop_map(move |value| (id, value)))
        })
        .collect();
    fields.prop_map(|values| {
        values
            .into_iter()
            .flatten()
            .fold(Record::new(), |record, (id, value)| record.with(id, value))
    })
}

/// Strategy for a generated schema together with a record of it.
pub fn schema_and_record_strategy(
    max_fields: u16,
) -> impl Strategy<Value = (TableSchema, Record)> {
    schema_strategy(max_fields).prop_flat_map(|schema| {
        let records = record_strategy(&schema);
        (Just(schema), records)
    })
}
