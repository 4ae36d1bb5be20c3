//! Sample schemas and store helpers.
//!
//! `compression_demo` is the three-field entity used by the format examples.
//! `test_entity` is the flat entity of the store test suite, one field per
//! scalar kind plus a string, a byte array and a date. `sample_entity`
//! adds what that one lacks: a custom default, a float vector, a nested
//! `sample_child` table and a buffer identifier.

use flatrec_codec::{FieldDef, ScalarType, ScalarValue, TableSchema};
use flatrec_store::{Model, Store, StoreConfig};
use std::borrow::Cow;
use std::ops::Deref;
use std::path::Path;
use tempfile::TempDir;

flatrec_codec::define_table! {
    /// The compression demo entity: an id, a timestamp and a byte payload.
    pub mod compression_demo {
        table CompressionDemoEntity;
        id id;
        fields {
            0 => id: u64,
            1 => timestamp: u64,
            2 => user_data: vector<i8>,
        }
    }
}

flatrec_codec::define_table! {
    /// The store test entity. `simple_date` holds milliseconds since the
    /// Unix epoch.
    pub mod test_entity {
        table TestEntity;
        id id;
        fields {
            0 => id: u64,
            1 => simple_boolean: bool,
            2 => simple_byte: i8,
            3 => simple_short: i16,
            4 => simple_int: i32,
            5 => simple_long: i64,
            6 => simple_float: f32,
            7 => simple_double: f64,
            8 => simple_string: string,
            9 => simple_byte_array: vector<i8>,
            10 => simple_date: u64,
        }
    }
}

flatrec_codec::define_table! {
    /// A small table nested inside `SampleEntity`.
    pub mod sample_child {
        table SampleChild;
        fields {
            0 => label: string,
            1 => depth: u16,
        }
    }
}

flatrec_codec::define_table! {
    /// An entity with one field of every kind. `date` holds milliseconds
    /// since the Unix epoch.
    pub mod sample_entity {
        table SampleEntity;
        identifier b"SMPL";
        id id;
        fields {
            0 => id: u64,
            1 => flag: bool,
            2 => tiny: i8,
            3 => small: i16,
            4 => count: u32 = 7,
            5 => date: i64,
            6 => ratio: f32,
            7 => score: f64,
            8 => name: string,
            9 => data: vector<u8>,
            10 => samples: vector<f64>,
            11 => child: table<sample_child>,
        }
    }
}

/// Number of fields in the first published version of `SampleEntity`.
pub const SAMPLE_ENTITY_V1_FIELDS: usize = 8;

/// `SampleEntity` as a reader built before `name` and everything after it
/// existed would see it.
#[must_use]
pub fn sample_entity_v1() -> TableSchema {
    sample_entity::SCHEMA.truncated(SAMPLE_ENTITY_V1_FIELDS)
}

/// `SampleEntity` with two fields appended, as a newer writer would declare it.
#[must_use]
pub fn sample_entity_v3() -> TableSchema {
    let mut fields = sample_entity::SCHEMA.fields.to_vec();
    fields.push(FieldDef::string(12, "note"));
    fields.push(
        FieldDef::scalar(13, "flags", ScalarType::UInt32).with_default(ScalarValue::UInt32(3)),
    );
    TableSchema {
        name: sample_entity::SCHEMA.name.clone(),
        identifier: sample_entity::SCHEMA.identifier,
        fields: Cow::Owned(fields),
    }
}

/// A compression demo record.
#[must_use]
pub fn demo_record(id: u64, timestamp: u64, user_data: &[i8]) -> compression_demo::Record {
    compression_demo::Record {
        id,
        timestamp,
        user_data: Some(user_data.to_vec()),
    }
}

/// A test entity with every field set away from its default.
#[must_use]
pub fn full_test_entity(id: u64) -> test_entity::Record {
    test_entity::Record {
        id,
        simple_boolean: true,
        simple_byte: -8,
        simple_short: -1600,
        simple_int: 2_000_000,
        simple_long: -9_000_000_000,
        simple_float: 1.25,
        simple_double: -3.5e10,
        simple_string: Some(format!("test-{id}")),
        simple_byte_array: Some(vec![-128, -1, 0, 1, 127]),
        simple_date: 1_700_000_000_000,
    }
}

/// A sample entity with every field set away from its default.
#[must_use]
pub fn full_sample_entity(id: u64) -> sample_entity::Record {
    sample_entity::Record {
        id,
        flag: true,
        tiny: -3,
        small: 1200,
        count: 40,
        date: 1_700_000_000_000,
        ratio: 0.25,
        score: 99.5,
        name: Some(format!("entity-{id}")),
        data: Some(vec![0, 1, 254, 255]),
        samples: Some(vec![1.5, -2.25]),
        child: Some(sample_child::Record {
            label: Some("child".to_string()),
            depth: 2,
        }),
    }
}

/// A model holding the compression demo, test and sample entities.
#[must_use]
pub fn demo_model() -> Model {
    let mut model = Model::new();
    model
        .add_entity_of::<compression_demo::Record>()
        .expect("compression demo schema is valid");
    model
        .add_entity_of::<test_entity::Record>()
        .expect("test entity schema is valid");
    model
        .add_entity_of::<sample_entity::Record>()
        .expect("sample entity schema is valid");
    model
}

/// A store over [`demo_model`] that cleans up after itself.
pub struct TestStore {
    /// The store.
    pub store: Store,
    /// Kept alive so the directory outlives the store.
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// An in-memory store.
    pub fn memory() -> Self {
        Self {
            store: Store::open_in_memory(demo_model()).expect("failed to open in-memory store"),
            _temp_dir: None,
        }
    }

    /// A store persisted in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let config = StoreConfig::new().directory(temp_dir.path());
        Self {
            store: Store::open(demo_model(), config).expect("failed to open store"),
            _temp_dir: Some(temp_dir),
        }
    }

    /// The data directory of a file-backed store.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Closes the store and opens the same directory again.
    ///
    /// # Panics
    ///
    /// Panics for an in-memory store or if reopening fails.
    pub fn reopen(self) -> Self {
        let temp_dir = self._temp_dir.expect("only file stores can be reopened");
        self.store.close().expect("failed to close store");
        let config = StoreConfig::new().directory(temp_dir.path());
        Self {
            store: Store::open(demo_model(), config).expect("failed to reopen store"),
            _temp_dir: Some(temp_dir),
        }
    }
}

impl Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs `f` with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs `f` with a temporary file-backed store and its directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("file store has a directory");
    f(&test_store.store, path)
}

/// Pre-populated stores.
pub mod scenarios {
    use super::*;

    /// A store with `count` demo entities, ids `1..=count`, timestamps
    /// `id * 10` and a payload of `id % 5` bytes.
    pub fn populated_store(count: u64) -> TestStore {
        let test_store = TestStore::memory();
        let demos = test_store
            .entity_box::<compression_demo::Record>()
            .expect("demo entity is in the model");
        let mut records: Vec<_> = (1..=count)
            .map(|id| {
                let payload: Vec<i8> = (0..id % 5).map(|n| n as i8).collect();
                demo_record(0, id * 10, &payload)
            })
            .collect();
        demos.put_many(&mut records).expect("failed to put demo entities");
        test_store
    }
}
