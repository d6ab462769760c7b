//! Collection index benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use partidx_bench::{collection, keys, layout};
use partidx_core::{CollectionIndex, Config};
use tempfile::TempDir;

fn config() -> Config {
    Config::new(8, layout()).shrink_seed(7)
}

/// Benchmark merging small deltas into a growing set of keys.
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_merge");
    group.sample_size(20);

    for key_count in [100usize, 1000].iter() {
        group.throughput(Throughput::Elements(*key_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(key_count),
            key_count,
            |b, &key_count| {
                let keys = keys(key_count);
                b.iter_with_setup(
                    || {
                        let dir = TempDir::new().unwrap();
                        let index = CollectionIndex::open(dir.path(), "bench", config()).unwrap();
                        (dir, index)
                    },
                    |(_dir, index)| {
                        for (i, key) in keys.iter().enumerate() {
                            index.merge(key, &collection([i as u64])).unwrap();
                        }
                        index.close().unwrap();
                    },
                );
            },
        );
    }

    group.finish();
}

/// Benchmark merges that relocate one key through every size class.
fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_growth");
    group.sample_size(20);

    group.bench_function("single_key_to_1024", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let index = CollectionIndex::open(dir.path(), "bench", config()).unwrap();
                (dir, index)
            },
            |(_dir, index)| {
                for i in 0..1024u64 {
                    index.merge(b"common-k", &collection([i])).unwrap();
                }
                index.close().unwrap();
            },
        );
    });

    group.finish();
}

/// Benchmark reads of collections of various sizes.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_get");

    for size in [1u64, 16, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let index = CollectionIndex::open(dir.path(), "bench", config()).unwrap();
            index.put(b"bench-k1", &collection(0..size)).unwrap();

            b.iter(|| {
                let found = index.get(black_box(b"bench-k1")).unwrap();
                black_box(found);
            });
        });
    }

    group.finish();
}

/// Benchmark a full rotating walk.
fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_iterate");
    group.sample_size(20);

    let dir = TempDir::new().unwrap();
    let index = CollectionIndex::open(dir.path(), "bench", config()).unwrap();
    let keys = keys(2000);
    for (i, key) in keys.iter().enumerate() {
        index.put(key, &collection(0..(i % 20) as u64 + 1)).unwrap();
    }
    let start = keys[1000];

    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("rotate_2000", |b| {
        b.iter(|| {
            let visited = index
                .keycollections(Some(&start[..]), None, true)
                .unwrap()
                .count();
            black_box(visited);
        });
    });

    group.finish();
}

/// Benchmark regenerating the location index.
fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_rebuild");
    group.sample_size(10);

    let dir = TempDir::new().unwrap();
    {
        let index = CollectionIndex::open(dir.path(), "bench", config()).unwrap();
        for (i, key) in keys(5000).iter().enumerate() {
            index.put(key, &collection(0..(i % 50) as u64 + 1)).unwrap();
        }
        index.close().unwrap();
    }

    group.bench_function("5000_keys", |b| {
        b.iter(|| {
            let index = CollectionIndex::open(dir.path(), "bench", config()).unwrap();
            index.mark_for_rebuild_on_exit().unwrap();
            index.close().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_merge,
    bench_growth,
    bench_get,
    bench_iterate,
    bench_rebuild
);
criterion_main!(benches);
