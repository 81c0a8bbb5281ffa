//! # Plan Benchmarks
//!
//! Performance benchmarks for the amilayer-core plan pipeline.
//!
//! Run with: `cargo bench -p amilayer-core`

use amilayer_core::{
    BuildGroup, ChangeDetector, CurrentState, DuplicatePolicy, GraphBuilder, ImageDeclaration,
    PlanOptions, StateSnapshot, plan,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

/// A single chain where every image is stale against its parent.
fn create_stale_chain(size: usize) -> (Vec<BuildGroup>, StateSnapshot) {
    let mut images = Vec::with_capacity(size);
    let mut state = StateSnapshot::new();

    for i in 0..size {
        let mut decl = ImageDeclaration::new(format!("img{i}")).with_version("1.0.0");
        if i > 0 {
            decl = decl.with_source(format!("img{}", i - 1));
        }
        images.push(decl);
        state.insert(
            format!("img{i}"),
            CurrentState::new("1.0.0", format!("ami-old-{i}"), format!("ami-{i}")),
        );
    }

    (vec![BuildGroup::new("chain", images)], state)
}

/// One base image with `size` children, half of them stale.
fn create_fan(size: usize) -> (Vec<BuildGroup>, StateSnapshot) {
    let mut images = vec![ImageDeclaration::new("base").with_version("1.0.0")];
    let mut state = StateSnapshot::new();
    state.insert("base", CurrentState::new("1.0.0", "ami-ext", "ami-base"));

    for i in 0..size {
        images.push(
            ImageDeclaration::new(format!("leaf{i}"))
                .with_version("1.0.0")
                .with_source("base"),
        );
        let source = if i % 2 == 0 { "ami-base" } else { "ami-stale" };
        state.insert(
            format!("leaf{i}"),
            CurrentState::new("1.0.0", source, format!("ami-leaf{i}")),
        );
    }

    (vec![BuildGroup::new("fan", images)], state)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");

    for size in [100, 1000, 5000].iter() {
        let (groups, state) = create_fan(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(
                    GraphBuilder::build(&groups, state.clone(), DuplicatePolicy::Overwrite)
                        .expect("build"),
                )
            });
        });
    }

    group.finish();
}

fn bench_chain_roots(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_roots");

    for size in [10, 100, 500].iter() {
        let (groups, state) = create_stale_chain(*size);
        let graph =
            GraphBuilder::build(&groups, state, DuplicatePolicy::Overwrite).expect("build");
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ChangeDetector::new(&graph).changed_roots().expect("roots")));
        });
    }

    group.finish();
}

fn bench_full_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_plan");

    for size in [100, 1000].iter() {
        let (groups, state) = create_fan(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(plan(&groups, state.clone(), &PlanOptions::default())));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_graph_build, bench_chain_roots, bench_full_plan);
criterion_main!(benches);
