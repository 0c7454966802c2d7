use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use std::time::Duration;

use seb_node::{BytesEncoder, EncoderRegistry, MemLatch, Node, NodeConfig};

const PAGE_SIZE: usize = 4096;
const VALUE_SIZE: usize = 100;
const SEED: u64 = 42;

/// Page fill levels to benchmark, expressed as pre-existing entry counts.
const FILL_LEVELS: &[usize] = &[0, 5, 15, 25];

fn generate_value(size: usize) -> Vec<u8> {
    vec![b'x'; size]
}

fn random_key(rng: &mut StdRng) -> Vec<u8> {
    format!("key_{:016x}", rng.next_u64()).into_bytes()
}

fn pre_populate(node: &mut Node<'_, Vec<u8>, Vec<u8>>, rng: &mut StdRng, count: usize, value: &[u8]) {
    for _ in 0..count {
        let key = random_key(rng);
        let sr = node.index_of(&key).unwrap();
        if seb_node::is_insertion_point(sr) {
            node.insert_value(sr, &key, &value.to_vec()).unwrap();
        }
    }
}

fn insert_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_latency");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    let value = generate_value(VALUE_SIZE);
    let registry: EncoderRegistry<Vec<u8>, Vec<u8>> = EncoderRegistry::new(0, BytesEncoder, BytesEncoder);
    let config = NodeConfig { page_size: PAGE_SIZE, ..NodeConfig::default() };

    for fill in FILL_LEVELS {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{fill}_pre_existing")),
            fill,
            |b, &fill| {
                b.iter_batched(
                    || {
                        let mut buf = vec![0u8; PAGE_SIZE];
                        let mut rng = StdRng::seed_from_u64(SEED);
                        {
                            let latch = MemLatch::new(0);
                            let mut node = Node::begin_create(&mut buf, &latch, &registry, config, true).unwrap();
                            pre_populate(&mut node, &mut rng, fill, &value);
                            node.end_create(&latch).unwrap();
                        }
                        (buf, rng)
                    },
                    |(mut buf, mut rng)| {
                        let latch = MemLatch::new(0);
                        let mut node = Node::begin_write(&mut buf, &latch, &registry, config).unwrap();
                        let key = random_key(&mut rng);
                        let sr = node.index_of(&key).unwrap();
                        if seb_node::is_insertion_point(sr) {
                            node.insert_value(sr, &key, &value).unwrap();
                        }
                        node.end_write(&latch).unwrap();
                        black_box(buf);
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, insert_latency);
criterion_main!(benches);
