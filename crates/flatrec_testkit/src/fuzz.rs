//! Fuzz harnesses for FlatRec buffers and the store.
//!
//! Each target takes arbitrary bytes and must never panic. They can be
//! driven by proptest, by the corpus in [`crate::vectors`], or by an
//! external fuzzer.

use crate::fixtures::{compression_demo, sample_entity};
use flatrec_codec::{root, verify, Record, TableSchema};
use flatrec_store::{PutMode, Store};

/// Reads `data` as a buffer of `schema`.
///
/// A buffer that passes the verifier must decode without error; any other
/// buffer may fail, but only with an error.
pub fn fuzz_read_with(data: &[u8], schema: &TableSchema) {
    let verified = verify(data, schema).is_ok();
    let decoded = Record::from_bytes(data, schema);
    if verified {
        assert!(
            decoded.is_ok(),
            "verified buffer failed to decode: {:?}",
            decoded.err()
        );
    }
    if let Ok(table) = root(data, schema) {
        let _ = table.slots().count();
        for field in schema.fields.iter() {
            let _ = table.is_present(field.id);
        }
    }
}

/// Reads `data` with every fixture schema.
pub fn fuzz_read(data: &[u8]) {
    fuzz_read_with(data, &compression_demo::SCHEMA);
    fuzz_read_with(data, &sample_entity::SCHEMA);
}

/// Reads every strict prefix of a valid buffer.
///
/// A prefix either fails verification or still holds every byte the full
/// buffer's record needs, in which case it decodes to the same record.
/// Returns how many prefixes verified.
///
/// # Panics
///
/// Panics if `buf` itself is not a valid buffer of `schema`.
pub fn fuzz_truncation(buf: &[u8], schema: &TableSchema) -> usize {
    let full = Record::from_bytes(buf, schema).expect("input must be a valid buffer");
    let mut verified = 0;
    for len in 0..buf.len() {
        let prefix = &buf[..len];
        if verify(prefix, schema).is_ok() {
            verified += 1;
            let decoded = Record::from_bytes(prefix, schema);
            assert_eq!(decoded.as_ref().ok(), Some(&full), "prefix of {len} bytes");
        }
    }
    verified
}

/// Overwrites every byte of a valid buffer with a few patterns and reads
/// the result. Returns how many mutated buffers still verified.
pub fn fuzz_corruption(buf: &[u8], schema: &TableSchema) -> usize {
    let mut verified = 0;
    let mut mutated = buf.to_vec();
    for at in 0..buf.len() {
        for pattern in [0x00, 0xff, buf[at] ^ 0x80, buf[at].wrapping_add(1)] {
            mutated[at] = pattern;
            if verify(&mutated, schema).is_ok() {
                verified += 1;
            }
            fuzz_read_with(&mutated, schema);
        }
        mutated[at] = buf[at];
    }
    verified
}

/// Runs store operations decoded from `data` against a fresh in-memory
/// store. Invalid buffers must be refused with an error.
///
/// Each operation takes two bytes: an opcode and an id.
pub fn fuzz_store_operations(data: &[u8]) {
    let Ok(store) = Store::open_in_memory(crate::fixtures::demo_model()) else {
        return;
    };
    let Ok(entity) = store.entity_id("CompressionDemoEntity") else {
        return;
    };

    for chunk in data.chunks_exact(2) {
        let id = u64::from(chunk[1]);
        let _ = store.write(|txn| {
            let mut cursor = txn.cursor(entity)?;
            match chunk[0] % 5 {
                0 => {
                    let record = crate::fixtures::demo_record(id, u64::from(chunk[0]), &[1, 2]);
                    let bytes = flatrec_codec::TableRecord::to_bytes(&record)?;
                    cursor.put(id, bytes, PutMode::Put)?;
                }
                1 => {
                    cursor.remove(id)?;
                }
                2 => {
                    cursor.get(id)?;
                }
                3 => {
                    cursor.put(id.max(1), data.to_vec(), PutMode::Insert)?;
                }
                _ => {
                    cursor.remove_all()?;
                }
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{demo_record, full_sample_entity};
    use flatrec_codec::TableRecord;

    #[test]
    fn read_handles_short_and_random_input() {
        fuzz_read(&[]);
        fuzz_read(&[0xff; 3]);
        fuzz_read(&[0; 64]);
        fuzz_read(&(0..=255u8).collect::<Vec<_>>());
    }

    #[test]
    fn truncations_of_demo_entity() {
        let bytes = demo_record(42, 1000, &[1, 2, 3]).to_bytes().unwrap();
        let verified = fuzz_truncation(&bytes, &compression_demo::SCHEMA);
        // Only the trailing alignment byte after the vector can go.
        assert_eq!(verified, 1);
    }

    #[test]
    fn corruption_of_full_entity() {
        let bytes = full_sample_entity(3).to_bytes().unwrap();
        fuzz_corruption(&bytes, &sample_entity::SCHEMA);
    }

    #[test]
    fn store_operations() {
        fuzz_store_operations(&[0, 1, 0, 2, 1, 1, 2, 2, 3, 9, 4, 0, 0, 3]);
        fuzz_store_operations(&[]);
    }
}
