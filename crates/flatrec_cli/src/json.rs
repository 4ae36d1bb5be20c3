//! JSON views of schemas and records.
//!
//! Records are JSON objects keyed by field name. Scalars are JSON numbers
//! or booleans, strings are strings, vectors are arrays of scalars and
//! nested tables are objects. `null` leaves a field unset.

use crate::error::{CliError, CliResult};
use flatrec_codec::{FieldKind, Record, ScalarType, ScalarValue, TableSchema, Value};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as Json};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reads a whole file.
pub fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|source| CliError::io(path, source))
}

/// Reads and parses a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = read_file(path)?;
    serde_json::from_slice(&bytes).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads and validates a schema file.
pub fn load_schema(path: &Path) -> CliResult<TableSchema> {
    let schema: TableSchema = read_json(path)?;
    schema.validate()?;
    debug!(table = %schema.name, fields = schema.fields.len(), "loaded schema");
    Ok(schema)
}

/// Converts a JSON object into a record of `schema`.
pub fn record_from_json(json: &Json, schema: &TableSchema) -> CliResult<Record> {
    let Json::Object(object) = json else {
        return Err(CliError::record(format!(
            "table {} must be a JSON object",
            schema.name
        )));
    };

    let mut record = Record::new();
    for (name, value) in object {
        let field = schema.field_by_name(name).ok_or_else(|| {
            CliError::record(format!("table {} has no field {name}", schema.name))
        })?;
        if value.is_null() {
            continue;
        }
        let value = match &field.kind {
            FieldKind::Scalar(ty) => Value::Scalar(scalar_from_json(value, *ty, name)?),
            FieldKind::String => Value::String(
                value
                    .as_str()
                    .ok_or_else(|| mismatch(name, "a string"))?
                    .to_string(),
            ),
            FieldKind::Vector(ty) => {
                let items = value.as_array().ok_or_else(|| mismatch(name, "an array"))?;
                Value::Vector(
                    items
                        .iter()
                        .map(|item| scalar_from_json(item, *ty, name))
                        .collect::<CliResult<_>>()?,
                )
            }
            FieldKind::Table(nested) => Value::Table(record_from_json(value, nested)?),
        };
        record.set(field.id, value);
    }
    Ok(record)
}

/// Converts a record of `schema` into a JSON object keyed by field name.
#[must_use]
pub fn record_to_json(record: &Record, schema: &TableSchema) -> Json {
    let mut object = Map::new();
    for (id, value) in record.iter() {
        let Some(field) = schema.field(id) else {
            continue;
        };
        let json = match (value, &field.kind) {
            (Value::Scalar(scalar), _) => scalar_to_json(*scalar),
            (Value::String(text), _) => Json::String(text.clone()),
            (Value::Vector(items), _) => {
                Json::Array(items.iter().copied().map(scalar_to_json).collect())
            }
            (Value::Table(nested), FieldKind::Table(nested_schema)) => {
                record_to_json(nested, nested_schema)
            }
            (Value::Table(_), _) => Json::Null,
        };
        object.insert(field.name.to_string(), json);
    }
    Json::Object(object)
}

fn mismatch(field: &str, expected: &str) -> CliError {
    CliError::record(format!("field {field} must be {expected}"))
}

fn scalar_from_json(json: &Json, ty: ScalarType, field: &str) -> CliResult<ScalarValue> {
    let value = match ty {
        ScalarType::Bool => json.as_bool().map(ScalarValue::Bool),
        ScalarType::Float32 => json.as_f64().map(|v| ScalarValue::Float32(v as f32)),
        ScalarType::Float64 => json.as_f64().map(ScalarValue::Float64),
        ScalarType::UInt64 => json.as_u64().map(ScalarValue::UInt64),
        _ => json.as_i64().and_then(|n| ScalarValue::from_i64(ty, n)),
    };
    value.ok_or_else(|| mismatch(field, &format!("a {ty} value")))
}

fn scalar_to_json(value: ScalarValue) -> Json {
    match value {
        ScalarValue::Bool(v) => Json::Bool(v),
        ScalarValue::UInt64(v) => Json::from(v),
        ScalarValue::Float32(v) => float_to_json(f64::from(v)),
        ScalarValue::Float64(v) => float_to_json(v),
        other => other.as_i64().map_or(Json::Null, Json::from),
    }
}

// NaN and infinities have no JSON form.
fn float_to_json(value: f64) -> Json {
    Number::from_f64(value).map_or(Json::Null, Json::Number)
}
