//! Integration tests for the object store.

use flatrec_codec::TableRecord;
use flatrec_store::{
    Model, OrderFlags, PutMode, Query, QueryParam, Store, StoreConfig, StoreError, StoreResult,
    DATA_FILE,
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

flatrec_codec::define_table! {
    mod item {
        table Item;
        id id;
        fields {
            0 => id: u64,
            1 => name: string,
            2 => amount: i64,
            3 => payload: vector<u8>,
        }
    }
}

fn model() -> Model {
    let mut model = Model::new();
    model.add_entity_of::<item::Record>().unwrap();
    model
}

fn item(id: u64, name: &str, amount: i64) -> item::Record {
    item::Record {
        id,
        name: Some(name.to_string()),
        amount,
        payload: Some(vec![amount as u8; 3]),
    }
}

#[derive(Debug, Clone)]
enum Op {
    Put { id: u64, amount: i64 },
    Insert { id: u64, amount: i64 },
    Remove { id: u64 },
    RemoveAll,
    Commit,
    Abort,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1u64..20, any::<i64>()).prop_map(|(id, amount)| Op::Put { id, amount }),
        2 => (1u64..20, any::<i64>()).prop_map(|(id, amount)| Op::Insert { id, amount }),
        3 => (1u64..20).prop_map(|id| Op::Remove { id }),
        1 => Just(Op::RemoveAll),
        2 => Just(Op::Commit),
        1 => Just(Op::Abort),
    ]
}

fn stored(store: &Store) -> BTreeMap<u64, i64> {
    let items = store.entity_box::<item::Record>().unwrap();
    items
        .get_all()
        .unwrap()
        .into_iter()
        .map(|record| (record.id, record.amount))
        .collect()
}

/// Replays `ops` against the store and a map, committing and aborting as
/// told, and returns the map of committed state.
fn replay(store: &Store, ops: &[Op]) -> BTreeMap<u64, i64> {
    let entity = store.entity_id("Item").unwrap();
    let mut committed = BTreeMap::new();
    let mut pending = committed.clone();
    let mut txn = store.begin_write().unwrap();

    for op in ops {
        match *op {
            Op::Put { id, amount } => {
                let bytes = item(id, "p", amount).to_bytes().unwrap();
                txn.cursor(entity).unwrap().put(id, bytes, PutMode::Put).unwrap();
                pending.insert(id, amount);
            }
            Op::Insert { id, amount } => {
                let bytes = item(id, "i", amount).to_bytes().unwrap();
                let result = txn.cursor(entity).unwrap().put(id, bytes, PutMode::Insert);
                if pending.contains_key(&id) {
                    assert!(matches!(result, Err(StoreError::UniqueViolated { .. })));
                } else {
                    result.unwrap();
                    pending.insert(id, amount);
                }
            }
            Op::Remove { id } => {
                let removed = txn.cursor(entity).unwrap().remove(id).unwrap();
                assert_eq!(removed, pending.remove(&id).is_some());
            }
            Op::RemoveAll => {
                let removed = txn.cursor(entity).unwrap().remove_all().unwrap();
                assert_eq!(removed, pending.len() as u64);
                pending.clear();
            }
            Op::Commit => {
                txn.commit().unwrap();
                committed = pending.clone();
                txn = store.begin_write().unwrap();
            }
            Op::Abort => {
                txn.abort().unwrap();
                pending = committed.clone();
                txn = store.begin_write().unwrap();
            }
        }
    }
    txn.commit().unwrap();
    pending
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn store_matches_map_model(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let store = Store::open_in_memory(model()).unwrap();
        let expected = replay(&store, &ops);
        prop_assert_eq!(stored(&store), expected);
    }

    #[test]
    fn reopen_restores_committed_state(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new().directory(dir.path()).sync_on_commit(false);
        let expected = {
            let store = Store::open(model(), config.clone()).unwrap();
            let expected = replay(&store, &ops);
            store.close().unwrap();
            expected
        };
        let store = Store::open(model(), config).unwrap();
        prop_assert_eq!(stored(&store), expected);
    }
}

#[test]
fn concurrent_writers_and_readers() {
    let store = Arc::new(Store::open_in_memory(model()).unwrap());
    let mut handles = Vec::new();

    for writer in 0..4i64 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let items = store.entity_box::<item::Record>().unwrap();
            for n in 0..25 {
                items.put(&mut item(0, "w", writer * 100 + n)).unwrap();
            }
        }));
    }
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            let entity = store.entity_id("Item").unwrap();
            for _ in 0..50 {
                let txn_count = store.read(|txn| {
                    let cursor = txn.cursor(entity)?;
                    let count = cursor.count()?;
                    assert_eq!(cursor.get_all()?.len() as u64, count);
                    Ok(count)
                });
                assert!(txn_count.unwrap() <= 100);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let ids: Vec<u64> = stored(&store).into_keys().collect();
    assert_eq!(ids, (1..=100).collect::<Vec<_>>());
}

#[test]
fn corrupt_data_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new().directory(dir.path());
    {
        let store = Store::open(model(), config.clone()).unwrap();
        let items = store.entity_box::<item::Record>().unwrap();
        items.put(&mut item(0, "kept", 1)).unwrap();
        store.close().unwrap();
    }

    let path = dir.path().join(DATA_FILE);
    let mut data = std::fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xff;
    std::fs::write(&path, data).unwrap();

    let err = Store::open(model(), config).unwrap_err();
    assert_eq!(err.code(), StoreError::CODE_FILE_CORRUPT);
}

#[test]
fn ordered_query_with_parameters() -> StoreResult<()> {
    let store = Store::open_in_memory(model())?;
    let items = store.entity_box::<item::Record>()?;
    let mut batch = vec![
        item(0, "pear", 4),
        item(0, "Apple", 9),
        item(0, "fig", -2),
        item(0, "banana", 7),
    ];
    items.put_many(&mut batch)?;

    let mut builder = items.query()?;
    builder.int_greater(item::field::amount, 0)?;
    builder.alias("min")?;
    builder.order(item::field::name, OrderFlags::empty())?;
    let mut query = builder.build()?;

    let names = |query: &Query| -> Vec<String> {
        items
            .find(query)
            .unwrap()
            .into_iter()
            .filter_map(|record| record.name)
            .collect()
    };
    assert_eq!(names(&query), vec!["Apple", "banana", "pear"]);

    query.set_param("min", QueryParam::Int(5))?;
    assert_eq!(names(&query), vec!["Apple", "banana"]);
    Ok(())
}

#[test]
fn write_transaction_is_exclusive_across_threads() {
    let store = Store::open_in_memory(model()).unwrap();
    let entity = store.entity_id("Item").unwrap();
    let txn = store.begin_write().unwrap();

    let other = store.clone();
    let waiter = thread::spawn(move || {
        other
            .write(|txn| {
                let bytes = item(2, "second", 2).to_bytes()?;
                txn.cursor(entity)?.put(2, bytes, PutMode::Insert)
            })
            .unwrap();
    });

    thread::sleep(std::time::Duration::from_millis(20));
    assert!(!waiter.is_finished());
    drop(txn);
    waiter.join().unwrap();
    assert_eq!(stored(&store).len(), 1);
}
