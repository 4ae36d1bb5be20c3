//! Inspect command implementation.

use crate::error::CliResult;
use crate::json::{load_schema, read_file, record_to_json};
use crate::Format;
use flatrec_codec::{buffer_identifier, root, root_unchecked_identifier, Record, TableSchema};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

// Reading the header and vtable needs no field definitions.
static OPAQUE: TableSchema = TableSchema::new("opaque", &[]);

/// Buffer inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Buffer path.
    pub path: String,
    /// Buffer size in bytes.
    pub size: usize,
    /// Position of the root table.
    pub root_offset: usize,
    /// Bytes 4..8 when they read as an identifier.
    pub identifier: Option<String>,
    /// Position of the root vtable.
    pub vtable_position: usize,
    /// Inline size of the root table in bytes.
    pub inline_size: usize,
    /// Vtable entries of the root table; zero means absent.
    pub slots: Vec<u16>,
    /// Table name from the schema (if given).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Decoded fields (if a schema was given).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
}

/// Runs the inspect command.
pub fn run(path: &Path, schema_path: Option<&Path>, format: Format) -> CliResult<()> {
    let buf = read_file(path)?;
    let schema = schema_path.map(load_schema).transpose()?;

    let mut result = inspect(&buf, schema.as_ref())?;
    result.path = path.display().to_string();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Describes `buf`, decoding its fields when `schema` is given.
pub fn inspect(buf: &[u8], schema: Option<&TableSchema>) -> CliResult<InspectResult> {
    let table = root_unchecked_identifier(buf, &OPAQUE)?;
    debug!(
        size = buf.len(),
        root = table.position(),
        slots = table.slot_count(),
        "read buffer header"
    );

    let identifier = buffer_identifier(buf)
        .filter(|bytes| bytes.iter().all(u8::is_ascii_graphic))
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    let (table_name, fields) = match schema {
        Some(schema) => {
            let record = Record::read(&root(buf, schema)?)?;
            (
                Some(schema.name.to_string()),
                Some(record_to_json(&record, schema)),
            )
        }
        None => (None, None),
    };

    Ok(InspectResult {
        path: String::new(),
        size: buf.len(),
        root_offset: table.position(),
        identifier,
        vtable_position: table.vtable_position(),
        inline_size: table.inline_size(),
        slots: table.slots().collect(),
        table: table_name,
        fields,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("FlatRec Buffer Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {} bytes", result.size);
    println!();
    println!("Header:");
    println!("  Root offset: {}", result.root_offset);
    println!(
        "  Identifier:  {}",
        result.identifier.as_deref().unwrap_or("(none)")
    );
    println!();
    println!("Root table:");
    println!("  Vtable at:   {}", result.vtable_position);
    println!("  Inline size: {} bytes", result.inline_size);
    println!("  Slots:");
    for (id, offset) in result.slots.iter().enumerate() {
        if *offset == 0 {
            println!("    [{id}] absent");
        } else {
            println!("    [{id}] offset {offset}");
        }
    }

    if let (Some(table), Some(serde_json::Value::Object(fields))) = (&result.table, &result.fields)
    {
        println!();
        println!("Fields ({table}):");
        for (name, value) in fields {
            println!("  {name}: {value}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatrec_codec::{FieldDef, ScalarType};
    use serde_json::json;

    static DEMO_FIELDS: [FieldDef; 3] = [
        FieldDef::scalar(0, "id", ScalarType::UInt64),
        FieldDef::scalar(1, "timestamp", ScalarType::UInt64),
        FieldDef::vector(2, "user_data", ScalarType::Int8),
    ];
    static DEMO: TableSchema = TableSchema::new("CompressionDemoEntity", &DEMO_FIELDS);

    fn demo_buffer(timestamp: u64) -> Vec<u8> {
        Record::new()
            .with(0, 42u64)
            .with(1, timestamp)
            .with(2, vec![1i8, 2, 3])
            .to_bytes(&DEMO)
            .unwrap()
    }

    #[test]
    fn header_without_schema() {
        let result = inspect(&demo_buffer(1000), None).unwrap();
        assert_eq!(result.size, 48);
        assert_eq!(result.root_offset, 16);
        assert_eq!(result.vtable_position, 6);
        assert_eq!(result.inline_size, 24);
        assert_eq!(result.slots, vec![16, 8, 4]);
        assert_eq!(result.identifier, None);
        assert!(result.fields.is_none());
    }

    #[test]
    fn absent_fields_have_zero_slots() {
        let result = inspect(&demo_buffer(0), Some(&DEMO)).unwrap();
        assert_eq!(result.slots[1], 0);
        assert_eq!(result.table.as_deref(), Some("CompressionDemoEntity"));
        assert_eq!(
            result.fields,
            Some(json!({"id": 42, "user_data": [1, 2, 3]}))
        );
    }

    #[test]
    fn identifier_is_reported() {
        let schema = DEMO.clone().with_identifier(*b"DEMO");
        let buf = Record::new().with(0, 7u64).to_bytes(&schema).unwrap();
        let result = inspect(&buf, Some(&schema)).unwrap();
        assert_eq!(result.identifier.as_deref(), Some("DEMO"));
        assert_eq!(result.fields, Some(json!({"id": 7})));
    }

    #[test]
    fn damaged_buffer_is_an_error() {
        assert!(inspect(&[1, 0], None).is_err());
        let mut buf = demo_buffer(5);
        buf[0] = 0xf0;
        assert!(inspect(&buf, None).is_err());
    }
}
