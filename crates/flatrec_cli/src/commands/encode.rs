//! Encode command implementation.

use crate::error::{CliError, CliResult};
use crate::json::{load_schema, read_json, record_from_json};
use flatrec_codec::TableSchema;
use std::fs;
use std::path::Path;
use tracing::info;

/// Runs the encode command.
pub fn run(schema_path: &Path, input: &Path, output: &Path) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let json: serde_json::Value = read_json(input)?;
    let buf = encode(&json, &schema)?;

    fs::write(output, &buf).map_err(|source| CliError::io(output, source))?;
    info!(table = %schema.name, size = buf.len(), "buffer written");
    println!("Wrote {} bytes to {}", buf.len(), output.display());
    Ok(())
}

/// Builds a finished buffer of `schema` from a JSON object.
pub fn encode(json: &serde_json::Value, schema: &TableSchema) -> CliResult<Vec<u8>> {
    let record = record_from_json(json, schema)?;
    Ok(record.to_bytes(schema)?)
}
