//! Format properties: round trips, schema evolution, minimality, cloning
//! and bounds safety.

use flatrec_codec::{root, verify, Builder, CodecError, Record, TableRecord, Value};
use flatrec_testkit::prelude::*;
use proptest::prelude::*;

fn clone_buffer(buf: &[u8], schema: &flatrec_codec::TableSchema) -> Vec<u8> {
    let table = root(buf, schema).unwrap();
    let mut builder = Builder::new();
    let cloned = builder.clone_table(table).unwrap();
    builder.finish_root(cloned, schema).unwrap();
    builder.into_bytes()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn typed_roundtrip(entity in sample_entity_strategy()) {
        let bytes = entity.to_bytes().unwrap();
        verify(&bytes, &sample_entity::SCHEMA).unwrap();
        prop_assert_eq!(sample_entity::Record::from_bytes(&bytes).unwrap(), entity);
    }

    #[test]
    fn test_entity_roundtrip(entity in test_entity_strategy()) {
        let bytes = entity.to_bytes().unwrap();
        verify(&bytes, &test_entity::SCHEMA).unwrap();
        prop_assert_eq!(test_entity::Record::from_bytes(&bytes).unwrap(), entity);
    }

    #[test]
    fn dynamic_roundtrip((schema, record) in schema_and_record_strategy(12)) {
        let bytes = record.to_bytes(&schema).unwrap();
        let decoded = Record::from_bytes(&bytes, &schema).unwrap();
        prop_assert_eq!(decoded, record.normalized(&schema));
    }

    #[test]
    fn old_reader_ignores_new_fields(
        entity in sample_entity_strategy(),
        note in "[a-z]{0,10}",
        flags in any::<u32>(),
    ) {
        let newer = sample_entity_v3();
        let mut record = Record::from_bytes(&entity.to_bytes().unwrap(), &newer).unwrap();
        record.set(12, note.as_str()).set(13, flags);
        let bytes = record.to_bytes(&newer).unwrap();

        verify(&bytes, &sample_entity::SCHEMA).unwrap();
        prop_assert_eq!(sample_entity::Record::from_bytes(&bytes).unwrap(), entity);

        let reread = Record::from_bytes(&bytes, &newer).unwrap();
        prop_assert_eq!(reread.get(12).and_then(Value::as_str), Some(note.as_str()));
    }

    #[test]
    fn new_reader_defaults_missing_fields(entity in sample_entity_strategy()) {
        let older = sample_entity_v1();
        let old_record = Record::from_bytes(&entity.to_bytes().unwrap(), &older).unwrap();
        let bytes = old_record.to_bytes(&older).unwrap();

        let read = sample_entity::Record::from_bytes(&bytes).unwrap();
        let expected = sample_entity::Record {
            name: None,
            data: None,
            samples: None,
            child: None,
            ..entity
        };
        prop_assert_eq!(read, expected);
    }

    #[test]
    fn default_scalars_are_not_written((schema, record) in schema_and_record_strategy(12)) {
        let bytes = record.to_bytes(&schema).unwrap();
        let table = root(&bytes, &schema).unwrap();
        let normalized = record.normalized(&schema);
        for field in schema.fields.iter() {
            prop_assert_eq!(table.is_present(field.id), normalized.get(field.id).is_some());
        }
    }

    #[test]
    fn clone_is_idempotent(entity in sample_entity_strategy()) {
        let bytes = entity.to_bytes().unwrap();
        let once = clone_buffer(&bytes, &sample_entity::SCHEMA);
        let twice = clone_buffer(&once, &sample_entity::SCHEMA);
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(sample_entity::Record::from_bytes(&once).unwrap(), entity);
    }

    #[test]
    fn truncated_buffers_never_misread(entity in sample_entity_strategy()) {
        let bytes = entity.to_bytes().unwrap();
        let verified = fuzz_truncation(&bytes, &sample_entity::SCHEMA);
        prop_assert!(verified < bytes.len());
    }

    #[test]
    fn vector_indices_past_the_end_are_none(
        payload in prop::collection::vec(any::<i8>(), 0..16),
        index in any::<usize>(),
    ) {
        let bytes = demo_record(1, 1, &payload).to_bytes().unwrap();
        let reader = compression_demo::Reader::from_root(&bytes).unwrap();
        let vector = reader.user_data().unwrap().unwrap();
        prop_assert_eq!(vector.get(index), payload.get(index).copied());
        let raw = reader
            .as_table()
            .raw_vector(compression_demo::field::user_data)
            .unwrap()
            .unwrap();
        prop_assert_eq!(raw.get(index).is_some(), index < payload.len());
    }

    #[test]
    fn unsigned_dates_compare_as_unsigned(
        dates in prop::collection::vec(any::<u64>(), 1..8),
        threshold in any::<u64>(),
    ) {
        let (found, expected) = with_temp_store(|store| {
            let entities = store.entity_box::<test_entity::Record>().unwrap();
            let mut expected = Vec::new();
            for date in &dates {
                let mut entity = test_entity::Record { simple_date: *date, ..Default::default() };
                let id = entities.put(&mut entity).unwrap();
                if *date > threshold {
                    expected.push(id);
                }
            }
            let mut builder = entities.query().unwrap();
            builder
                .int_greater(test_entity::field::simple_date, threshold as i64)
                .unwrap();
            let query = builder.build().unwrap();
            let found = store.read(|txn| query.find_ids(txn, 0, 0)).unwrap();
            (found, expected)
        });
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..256)) {
        fuzz_read(&data);
    }

    #[test]
    fn store_ops_never_panic(data in prop::collection::vec(any::<u8>(), 0..64)) {
        fuzz_store_operations(&data);
    }
}

#[test]
fn all_defaults_leave_an_empty_vtable() {
    let entity = sample_entity::Record::default();
    let bytes = entity.to_bytes().unwrap();
    let table = root(&bytes, &sample_entity::SCHEMA).unwrap();
    assert!(table.slots().all(|slot| slot == 0));
    assert_eq!(table.get::<u32>(sample_entity::field::count).unwrap(), 7);
    assert_eq!(sample_entity::Record::from_bytes(&bytes).unwrap(), entity);
}

#[test]
fn child_field_refuses_a_table_of_another_schema() {
    let mut builder = Builder::new();
    let stranger = test_entity::create(&mut builder, &full_test_entity(1)).unwrap();
    let child = sample_child::create(
        &mut builder,
        &sample_child::Record {
            label: Some("kid".to_string()),
            depth: 1,
        },
    )
    .unwrap();

    builder.start_table(&sample_entity::SCHEMA);
    let err = builder
        .add_reference(sample_entity::field::child, stranger)
        .unwrap_err();
    assert!(matches!(err, CodecError::SchemaMismatch { .. }));
    builder
        .add_reference(sample_entity::field::child, child)
        .unwrap();
    let root_ref = builder.end_table().unwrap();
    builder.finish_root(root_ref, &sample_entity::SCHEMA).unwrap();

    let read = sample_entity::Record::from_bytes(builder.finished_data()).unwrap();
    assert_eq!(read.child.unwrap().label.as_deref(), Some("kid"));
}

#[test]
fn cloning_a_table_twice_reuses_it() {
    let bytes = full_sample_entity(9).to_bytes().unwrap();
    let table = root(&bytes, &sample_entity::SCHEMA).unwrap();
    let mut builder = Builder::new();
    let first = builder.clone_table(table).unwrap();
    let written = builder.len();
    let second = builder.clone_table(table).unwrap();
    assert_eq!(first, second);
    assert_eq!(builder.len(), written);
}

#[test]
fn demo_entity_scenarios() {
    let full = demo_record(42, 1000, &[1, 2, 3]).to_bytes().unwrap();
    let reader = compression_demo::Reader::from_root(&full).unwrap();
    assert_eq!(reader.id().unwrap(), 42);
    assert_eq!(reader.timestamp().unwrap(), 1000);
    assert_eq!(reader.user_data().unwrap().unwrap().to_vec(), vec![1, 2, 3]);

    let small = demo_record(42, 0, &[]).to_bytes().unwrap();
    let reader = compression_demo::Reader::from_root(&small).unwrap();
    let table = reader.as_table();
    assert!(!table.is_present(compression_demo::field::timestamp));
    assert_eq!(reader.timestamp().unwrap(), 0);
    assert!(reader.user_data().unwrap().unwrap().is_empty());
    assert!(small.len() < full.len());
}

#[test]
fn out_of_range_vtable_entry_is_an_error() {
    let mut bytes = demo_record(42, 1000, &[1, 2, 3]).to_bytes().unwrap();
    // The vtable starts at byte 6; the id slot is its third entry.
    bytes[10] = 0xff;
    bytes[11] = 0xff;

    let table = root(&bytes, &compression_demo::SCHEMA).unwrap();
    let err = table.get::<u64>(compression_demo::field::id).unwrap_err();
    assert!(err.is_corruption());
    assert!(matches!(
        verify(&bytes, &compression_demo::SCHEMA),
        Err(CodecError::CorruptBuffer { .. })
    ));
    assert_eq!(table.get::<u64>(compression_demo::field::timestamp).unwrap(), 1000);
}

#[test]
fn every_truncation_of_the_demo_entity_is_safe() {
    let bytes = demo_record(42, 1000, &[1, 2, 3]).to_bytes().unwrap();
    for len in 0..bytes.len() - 1 {
        assert!(
            compression_demo::Record::from_bytes(&bytes[..len]).is_err(),
            "prefix of {len} bytes decoded"
        );
    }
}
