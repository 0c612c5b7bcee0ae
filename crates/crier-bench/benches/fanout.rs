//! Fan-out throughput benchmarks.
//!
//! These measure the engine's dispatch overhead against an in-memory store
//! and a no-op transport, so the numbers reflect the fan-out machinery
//! rather than any real network.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crier_bench::seeded_engine;
use crier_model::Content;

/// Benchmark direct fan-out at increasing recipient counts.
fn bench_fanout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        let engine = rt.block_on(seeded_engine(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let report = rt
                    .block_on(engine.publish("bench", black_box(Content::text("benchmark post"))))
                    .unwrap();
                assert_eq!(report.delivered, size);
                report
            });
        });
    }

    group.finish();
}

/// Benchmark the ordered catch-up read path.
fn bench_catchup_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("catch_up_empty", |b| {
        let engine = rt.block_on(seeded_engine(1));
        b.iter(|| rt.block_on(engine.catch_up(black_box("bot-0"), 5)).unwrap());
    });
}

criterion_group!(benches, bench_fanout, bench_catchup_read);
criterion_main!(benches);
