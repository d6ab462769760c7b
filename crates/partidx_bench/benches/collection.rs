//! Collection codec and set benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use partidx_bench::{layout, random_collection};
use partidx_core::{Collection, DayStamp};

/// Benchmark merging two random collections.
fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_merge");

    for size in [16usize, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*size as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let left = random_collection(size);
            let right = random_collection(size);

            b.iter(|| {
                let merged = black_box(&left).merge(black_box(&right));
                black_box(merged);
            });
        });
    }

    group.finish();
}

/// Benchmark exporting a collection into a padded partition blob.
fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_export");

    for size in [16usize, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let collection = random_collection(size);
            let day = DayStamp::today();

            b.iter(|| {
                let blob = collection.export(black_box(size.next_power_of_two()), day);
                black_box(blob);
            });
        });
    }

    group.finish();
}

/// Benchmark importing a partition blob.
fn bench_import(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_import");

    for size in [16usize, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let blob = random_collection(size).export(size.next_power_of_two(), DayStamp::today());

            b.iter(|| {
                let collection = Collection::import(layout(), black_box(&blob)).unwrap();
                black_box(collection);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge, bench_export, bench_import);
criterion_main!(benches);
