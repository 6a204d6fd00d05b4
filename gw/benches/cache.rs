//! Latency of the interaction cache hot paths
//!
//! - snapshot reads served to the feed on every frame
//! - the swipe fast path, which must stay well under one frame (16ms)
//! - an awaited mark, for comparison

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

use gigwork::writeback::WriteBack;
use gigwork::{InteractionCache, MemoryReconsiderationStore, Policies};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn seeded_cache(rt: &Runtime, jobs: usize) -> InteractionCache {
    rt.block_on(async {
        let cache = InteractionCache::spawn(
            Arc::new(MemoryReconsiderationStore::new()),
            WriteBack::new(),
            Policies::default(),
            4096,
        );
        let applied = (0..jobs).filter(|i| i % 2 == 0).map(|i| format!("job-{}", i)).collect();
        let rejected = (0..jobs).filter(|i| i % 2 == 1).map(|i| format!("job-{}", i)).collect();
        cache
            .bulk_load(applied, rejected, Default::default())
            .await
            .unwrap();
        cache
    })
}

fn bench_snapshot_reads(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("snapshot_reads");
    for jobs in [100usize, 10_000] {
        let cache = seeded_cache(&rt, jobs);
        let feed: Vec<String> = (0..50).map(|i| format!("job-{}", i * 7)).collect();
        group.bench_with_input(BenchmarkId::new("is_processed", jobs), &jobs, |b, _| {
            b.iter(|| black_box(cache.is_processed(black_box("job-42"))));
        });
        group.bench_with_input(BenchmarkId::new("filter_feed_50", jobs), &jobs, |b, _| {
            b.iter(|| black_box(cache.filter_feed(feed.iter())));
        });
    }
    group.finish();
}

fn bench_marks(c: &mut Criterion) {
    let rt = runtime();
    let cache = seeded_cache(&rt, 1_000);
    let mut group = c.benchmark_group("marks");
    let mut n = 0u64;
    group.bench_function("mark_rejected_fast", |b| {
        b.iter(|| {
            n += 1;
            // Drain now and then so the queue never reports busy
            if n % 1024 == 0 {
                rt.block_on(cache.mark_rejected("drain")).unwrap();
            }
            black_box(cache.mark_rejected_fast(&format!("swipe-{}", n % 512)))
        });
    });
    group.bench_function("mark_applied_awaited", |b| {
        b.iter(|| {
            n += 1;
            rt.block_on(cache.mark_applied(&format!("apply-{}", n % 512))).unwrap();
        });
    });
    group.finish();
}

criterion_group!(
    name = cache_benchmarks;
    config = Criterion::default().significance_level(0.05).noise_threshold(0.02);
    targets = bench_snapshot_reads, bench_marks
);

criterion_main!(cache_benchmarks);
