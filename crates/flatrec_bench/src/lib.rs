//! Benchmark utilities.

use flatrec_testkit::{compression_demo, demo_record, sample_child, sample_entity};
use rand::Rng;

/// Random signed bytes for a demo payload.
pub fn random_payload(size: usize) -> Vec<i8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Demo records without ids, each with a payload of `payload_size` bytes.
pub fn generate_demos(count: usize, payload_size: usize) -> Vec<compression_demo::Record> {
    (0..count)
        .map(|n| demo_record(0, n as u64, &random_payload(payload_size)))
        .collect()
}

/// A sample entity with `samples` random readings and a nested child.
pub fn random_entity(id: u64, samples: usize) -> sample_entity::Record {
    let mut rng = rand::thread_rng();
    sample_entity::Record {
        id,
        flag: rng.gen(),
        tiny: rng.gen(),
        small: rng.gen(),
        count: rng.gen(),
        date: rng.gen(),
        ratio: rng.gen(),
        score: rng.gen(),
        name: Some(format!("entity-{id}")),
        data: Some((0..64).map(|_| rng.gen()).collect()),
        samples: Some((0..samples).map(|_| rng.gen()).collect()),
        child: Some(sample_child::Record {
            label: Some("child".to_string()),
            depth: rng.gen(),
        }),
    }
}
