//! Benchmarks for the render/commit/update pipeline.
//!
//! Measures a cold mount of a keyed list, keyed reorders against a mounted
//! list, and the update path of a toggled `Mount`.
//!
//! Run with: cargo bench -p sprig-harness --bench work_loop_bench

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use sprig_harness::{Harness, element};
use sprig_reactive::{Signal, SignalList};
use sprig_runtime::VirtualNode;
use std::hint::black_box;

fn keyed(list: &SignalList<u32>) -> VirtualNode {
    VirtualNode::for_each(
        list.clone(),
        |n: &u32| *n,
        |n: &u32| element(&n.to_string(), [element("cell", [])]),
    )
}

/// Keep the operation log and backend journal from growing across iterations.
fn reset_logs(harness: &mut Harness) {
    harness.renderer.clear_operation_log();
    harness.natives().take_journal();
}

// =============================================================================
// Cold mount
// =============================================================================

fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_loop/mount");

    for len in [16_u32, 128, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter_batched(
                || (Harness::new(), SignalList::new(0..len)),
                |(mut harness, list)| {
                    harness.mount(keyed(&list));
                    black_box(harness.natives().node_count())
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// =============================================================================
// Keyed reorders
// =============================================================================

fn bench_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_loop/reorder");

    for len in [16_u32, 128, 1024] {
        let list = SignalList::new(0..len);
        let mut harness = Harness::new();
        harness.mount(keyed(&list));

        group.bench_with_input(BenchmarkId::new("rotate", len), &len, |b, _| {
            b.iter(|| {
                list.move_item(0, list.len() - 1);
                let stats = harness.flush();
                reset_logs(&mut harness);
                black_box(stats)
            })
        });

        group.bench_with_input(BenchmarkId::new("reverse", len), &len, |b, _| {
            b.iter(|| {
                let mut items = list.to_vec();
                items.reverse();
                list.replace_all(items);
                let stats = harness.flush();
                reset_logs(&mut harness);
                black_box(stats)
            })
        });

    }

    group.finish();
}

// =============================================================================
// Update path
// =============================================================================

fn bench_mount_toggle(c: &mut Criterion) {
    let open = Signal::new(false);
    let mut harness = Harness::new();
    harness.mount(VirtualNode::mount(
        &open,
        (0..8).map(|i| element(&format!("row{i}"), [])),
    ));

    c.bench_function("work_loop/mount_toggle", |b| {
        b.iter(|| {
            open.update(|v| *v = !*v);
            let stats = harness.flush();
            reset_logs(&mut harness);
            black_box(stats)
        })
    });
}

criterion_group!(benches, bench_mount, bench_reorder, bench_mount_toggle);
criterion_main!(benches);
