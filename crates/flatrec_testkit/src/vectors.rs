//! Test vectors with known bytes.
//!
//! Each vector pins the exact output of the builder for one record, so a
//! change to the layout rules shows up as a byte diff rather than as a
//! round-trip that still happens to work.

use crate::fixtures::{compression_demo, demo_record};
use flatrec_codec::{CodecResult, TableRecord};
use serde::{Deserialize, Serialize};

/// One record and the buffer the builder must produce for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Table the buffer holds.
    pub table: String,
    /// Expected buffer (hex-encoded).
    pub expected_hex: String,
}

impl TestVector {
    /// The expected buffer.
    pub fn expected(&self) -> Vec<u8> {
        hex_decode(&self.expected_hex)
    }
}

/// Compression demo vectors, paired with the records they encode.
pub fn compression_demo_vectors() -> Vec<(compression_demo::Record, TestVector)> {
    vec![
        (
            demo_record(42, 1000, &[1, 2, 3]),
            TestVector {
                id: "demo_full".into(),
                description: "id 42, timestamp 1000, user_data [1, 2, 3]".into(),
                table: "CompressionDemoEntity".into(),
                expected_hex: concat!(
                    "10000000",         // root offset
                    "0000",             // padding
                    "0a00180010000800", // vtable: size 10, table 24, id 16, timestamp 8
                    "0400",             // user_data 4
                    "0a000000",         // table: soffset back to the vtable
                    "14000000",         // user_data offset
                    "e803000000000000", // timestamp
                    "2a00000000000000", // id
                    "03000000",         // vector length
                    "01020300",         // elements, padding
                )
                .into(),
            },
        ),
        (
            demo_record(42, 0, &[]),
            TestVector {
                id: "demo_zero_timestamp".into(),
                description: "id 42, timestamp 0 (absent), user_data []".into(),
                table: "CompressionDemoEntity".into(),
                expected_hex: concat!(
                    "10000000",         // root offset
                    "0000",             // padding
                    "0a00100008000000", // vtable: size 10, table 16, id 8, timestamp absent
                    "0400",             // user_data 4
                    "0a000000",         // table: soffset back to the vtable
                    "10000000",         // user_data offset
                    "2a00000000000000", // id
                    "00000000",         // padding
                    "00000000",         // vector length
                )
                .into(),
            },
        ),
        (
            demo_record(0, 0, &[]),
            TestVector {
                id: "demo_defaults".into(),
                description: "all scalars default, empty user_data".into(),
                table: "CompressionDemoEntity".into(),
                expected_hex: concat!(
                    "10000000", // root offset
                    "0000",     // padding
                    "0a00",     // vtable: size 10
                    "0800",     // table 8
                    "00000000", // id, timestamp absent
                    "0400",     // user_data 4
                    "0a000000", // table: soffset back to the vtable
                    "04000000", // user_data offset
                    "00000000", // vector length
                )
                .into(),
            },
        ),
    ]
}

/// Encodes `record` and compares it with `vector`.
///
/// # Errors
///
/// Returns the encoding error, if any. A byte mismatch is reported as
/// `Ok(Some(actual_hex))`.
pub fn check_vector<R: TableRecord>(
    record: &R,
    vector: &TestVector,
) -> CodecResult<Option<String>> {
    let actual = record.to_bytes()?;
    if actual == vector.expected() {
        Ok(None)
    } else {
        Ok(Some(hex_encode(&actual)))
    }
}

/// All vectors as pretty-printed JSON, for sharing with other readers of
/// the format.
pub fn all_vectors_json() -> String {
    let vectors: Vec<TestVector> = compression_demo_vectors()
        .into_iter()
        .map(|(_, vector)| vector)
        .collect();
    serde_json::to_string_pretty(&vectors).expect("test vectors serialize")
}

/// Encodes bytes as a lowercase hexadecimal string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a hexadecimal string, ignoring whitespace.
///
/// # Panics
///
/// Panics on characters that are not hex digits or an odd digit count.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let hex = hex.replace([' ', '\n', '\r'], "");
    assert!(hex.len() % 2 == 0, "odd number of hex digits");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("invalid hex"))
        .collect()
}
