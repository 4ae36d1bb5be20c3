//! Verify command implementation.

use crate::error::{CliError, CliResult};
use crate::json::{load_schema, read_file};
use flatrec_codec::{root, verify, TableSchema};
use std::path::Path;
use tracing::debug;

/// Runs the verify command.
///
/// Fails with [`CliError::VerificationFailed`] when the buffer does not
/// pass, so the process exits non-zero.
pub fn run(path: &Path, schema_path: &Path) -> CliResult<()> {
    let buf = read_file(path)?;
    let schema = load_schema(schema_path)?;
    println!("Verifying {} as {}", path.display(), schema.name);

    match check(&buf, &schema) {
        Ok(present) => {
            println!("  {} bytes, {present} fields present", buf.len());
            println!();
            println!("✓ Buffer verification passed");
            Ok(())
        }
        Err(err) => {
            println!();
            println!("✗ Buffer verification failed: {err}");
            Err(err)
        }
    }
}

/// Verifies `buf` and returns how many root fields it carries.
pub fn check(buf: &[u8], schema: &TableSchema) -> CliResult<usize> {
    verify(buf, schema).map_err(CliError::VerificationFailed)?;
    let present = root(buf, schema)?
        .slots()
        .filter(|offset| *offset != 0)
        .count();
    debug!(size = buf.len(), present, "buffer verified");
    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatrec_codec::{FieldDef, Record, ScalarType};

    static NOTE_FIELDS: [FieldDef; 2] = [
        FieldDef::scalar(0, "id", ScalarType::UInt32),
        FieldDef::string(1, "text").required(),
    ];
    static NOTE: TableSchema = TableSchema::new("Note", &NOTE_FIELDS);

    #[test]
    fn valid_buffer_passes() {
        let buf = Record::new()
            .with(0, 3u32)
            .with(1, "hello")
            .to_bytes(&NOTE)
            .unwrap();
        assert_eq!(check(&buf, &NOTE).unwrap(), 2);
    }

    #[test]
    fn truncated_buffer_fails() {
        let buf = Record::new()
            .with(0, 3u32)
            .with(1, "hello")
            .to_bytes(&NOTE)
            .unwrap();
        let err = check(&buf[..buf.len() - 4], &NOTE).unwrap_err();
        assert!(matches!(err, CliError::VerificationFailed(_)));
    }

    #[test]
    fn missing_required_field_fails() {
        let optional = TableSchema::owned(
            "Note",
            vec![
                FieldDef::scalar(0, "id", ScalarType::UInt32),
                FieldDef::string(1, "text"),
            ],
        );
        let buf = Record::new().with(0, 7u32).to_bytes(&optional).unwrap();
        let err = check(&buf, &NOTE).unwrap_err();
        assert!(matches!(err, CliError::VerificationFailed(_)));
    }
}
