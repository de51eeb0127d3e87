//! Performance benchmarks for graph resolution.
//!
//! Run with: `cargo bench --bench resolution`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Single entry, hinted | <100µs | Hint lookup, no inspection |
//! | Single entry, inspected | <150µs | Cold shape inspection |
//! | Wide fan-out (100 refs) | Sub-linear latency | Props resolve concurrently |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use std::sync::Arc;

use resolve_engine::{
    Engine, HintStore, ResolvableMap, ResolverRegistry, StoreSnapshot,
};

/// A state map with one page fanning out to `width` referenced sections.
fn fan_out_state(width: usize) -> ResolvableMap {
    let mut state = ResolvableMap::new();
    let refs: Vec<Value> = (0..width)
        .map(|i| json!({"__ref": format!("section-{i}")}))
        .collect();
    state.insert(
        "page".to_string(),
        json!({"__type": "Page", "title": "bench", "sections": refs}),
    );
    for i in 0..width {
        state.insert(
            format!("section-{i}"),
            json!({"__type": "Section", "heading": format!("h{i}"), "body": "text"}),
        );
    }
    state
}

fn bench_registry() -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    registry.register_fn("Page", |props, _ctx| async move { Ok(props) });
    registry.register_fn("Section", |props, _ctx| async move { Ok(props) });
    registry
}

/// Hinted vs inspected resolution of the same entry.
fn bench_hint_modes(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let state = fan_out_state(8);
    let snapshot = Arc::new(StoreSnapshot::new(state.clone(), ResolvableMap::new()));

    let hinted = Engine::builder(bench_registry())
        .hints(HintStore::generate(&state))
        .build();
    let inspected = Engine::builder(bench_registry()).build();

    let mut group = c.benchmark_group("hint_modes");
    group.throughput(Throughput::Elements(1));

    group.bench_function("hinted", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ctx = hinted.context(snapshot.clone());
                black_box(hinted.resolve_entry("page", &ctx).await.unwrap())
            })
        })
    });

    group.bench_function("inspected", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ctx = inspected.context(snapshot.clone());
                black_box(inspected.resolve_entry("page", &ctx).await.unwrap())
            })
        })
    });

    group.finish();
}

/// Latency as reference fan-out grows.
fn bench_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("fan_out");

    for width in [1usize, 10, 100] {
        let state = fan_out_state(width);
        let snapshot = Arc::new(StoreSnapshot::new(state.clone(), ResolvableMap::new()));
        let engine = Engine::builder(bench_registry())
            .hints(HintStore::generate(&state))
            .build();

        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let ctx = engine.context(snapshot.clone());
                    black_box(engine.resolve_entry("page", &ctx).await.unwrap())
                })
            })
        });
    }

    group.finish();
}

/// Cost of generating hints from a full state map.
fn bench_hint_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("hint_generation");

    for entries in [10usize, 100] {
        let state = fan_out_state(entries);
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &state, |b, state| {
            b.iter(|| black_box(HintStore::generate(state)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_hint_modes,
    bench_fan_out,
    bench_hint_generation
);
criterion_main!(benches);
