//! Benchmarks for layered property resolution

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use layered_config_cache::{RuntimeContext, RuntimeContextBuilder};

fn bench_runtime() -> RuntimeContext {
    RuntimeContextBuilder::new()
        .with_properties("defaults", 100, [("host", "localhost"), ("port", "8080")])
        .with_properties(
            "app",
            250,
            [
                ("plain.key", "value"),
                ("url", "http://${host}:${port}/api"),
                ("%prod.profiled.key", "profiled"),
            ],
        )
        .build()
        .unwrap_or_else(|_| panic!("Failed to build runtime"))
}

/// Benchmark a plain lookup across the layered chain
fn bench_plain_resolution(c: &mut Criterion) {
    let runtime = bench_runtime();

    c.bench_function("resolve_plain_key", |b| {
        b.iter(|| {
            black_box(
                runtime
                    .config()
                    .resolve("plain.key")
                    .unwrap_or_else(|_| panic!("Resolution failed")),
            );
        });
    });
}

/// Benchmark a profile-prefixed lookup
fn bench_profiled_resolution(c: &mut Criterion) {
    let runtime = bench_runtime();

    c.bench_function("resolve_profiled_key", |b| {
        b.iter(|| {
            black_box(
                runtime
                    .config()
                    .resolve("profiled.key")
                    .unwrap_or_else(|_| panic!("Resolution failed")),
            );
        });
    });
}

/// Benchmark expansion with two nested references (cached templates)
fn bench_expression_resolution(c: &mut Criterion) {
    let runtime = bench_runtime();

    c.bench_function("resolve_expression_key", |b| {
        b.iter(|| {
            black_box(
                runtime
                    .config()
                    .resolve("url")
                    .unwrap_or_else(|_| panic!("Resolution failed")),
            );
        });
    });
}

criterion_group!(
    benches,
    bench_plain_resolution,
    bench_profiled_resolution,
    bench_expression_resolution
);
criterion_main!(benches);
