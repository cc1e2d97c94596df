use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use titanrx::prelude::{BackpressureStrategy, Flowable, Observable};

fn run_observable_chain(total: usize) -> Duration {
    let sum = Arc::new(AtomicU64::new(0));
    let s = sum.clone();

    let start = Instant::now();
    Observable::range(0, total)
        .map(|v| v.wrapping_mul(3))
        .filter(|v| v % 2 == 0)
        .subscribe(move |v| {
            s.fetch_add(black_box(v as u64), Ordering::Relaxed);
        });
    let elapsed = start.elapsed();

    black_box(sum.load(Ordering::Relaxed));
    elapsed
}

fn run_flowable_chain(total: usize) -> Duration {
    let sum = Arc::new(AtomicU64::new(0));
    let s = sum.clone();

    let start = Instant::now();
    Observable::range(0, total)
        .to_flowable(BackpressureStrategy::Buffer)
        .map(|v| v.wrapping_mul(3))
        .subscribe(move |v| {
            s.fetch_add(black_box(v as u64), Ordering::Relaxed);
        });
    let elapsed = start.elapsed();

    black_box(sum.load(Ordering::Relaxed));
    elapsed
}

fn run_flowable_pull(total: usize) -> Duration {
    let start = Instant::now();
    let out = Flowable::range(0, total)
        .take(total as u64)
        .blocking_collect(Duration::from_secs(30))
        .unwrap_or_default();
    let elapsed = start.elapsed();

    black_box(out.len());
    elapsed
}

pub fn bench_operator_hot_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("operator_hot_loop");

    for &items in &[10_000_usize, 100_000, 1_000_000] {
        group.bench_function(BenchmarkId::new("observable_map_filter", items), |b| {
            b.iter_custom(|n| (0..n).map(|_| run_observable_chain(items)).sum());
        });
        group.bench_function(BenchmarkId::new("flowable_buffered_map", items), |b| {
            b.iter_custom(|n| (0..n).map(|_| run_flowable_chain(items)).sum());
        });
        group.bench_function(BenchmarkId::new("flowable_pull_take", items), |b| {
            b.iter_custom(|n| (0..n).map(|_| run_flowable_pull(items)).sum());
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(3))
        .sample_size(12);
    targets = bench_operator_hot_loop
}
criterion_main!(benches);
