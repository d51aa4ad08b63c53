//! Handoff benchmark: publish/consume cost and a full two-phase cycle.
//!
//! The consumer side runs on the real-time path and must stay well below the
//! 1 ms cycle for up to `MAX_AXES` axes.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use relay_common::consts::MAX_AXES;
use relay_common::relay::handles::HandleRegistry;
use relay_common::relay::types::CommandRecord;
use relay_core::handoff::handoff;
use relay_core::relay::ReferenceRelay;

fn ramp(n: usize, offset: f64) -> Vec<f64> {
    (0..n).map(|i| offset + i as f64 * 0.001).collect()
}

fn bench_publish_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff_publish_consume");
    for n in [1usize, 6, 16, MAX_AXES] {
        let (tx, mut rx) = handoff(n);
        let record = CommandRecord::from_slice(&ramp(n, 1.0)).unwrap_or_default();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                tx.publish(black_box(&record));
                black_box(rx.try_consume().map(CommandRecord::len));
            })
        });
    }
    group.finish();
}

fn bench_consume_empty(c: &mut Criterion) {
    let (_tx, mut rx) = handoff(MAX_AXES);
    c.bench_function("handoff_consume_empty", |b| {
        b.iter(|| black_box(rx.try_consume().is_none()))
    });
}

/// Phase 1 (pull + validate) and phase 2 (write handles) for N axes.
fn bench_full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_full_cycle");
    for n in [1usize, 6, 16, MAX_AXES] {
        let handles = HandleRegistry::new();
        let outputs: Vec<_> = (0..n)
            .filter_map(|i| handles.register(&format!("joint{i}/position"), 0.0).ok())
            .collect();
        let (tx, rx) = handoff(n);
        let mut relay = ReferenceRelay::new(rx, n);
        let values = ramp(n, 0.5);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let _ = tx.publish_slice(&values);
                let _ = black_box(relay.pull());
                black_box(relay.write(&outputs))
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_publish_consume,
    bench_consume_empty,
    bench_full_cycle
);
criterion_main!(benches);
