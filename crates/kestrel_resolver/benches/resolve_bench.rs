//! Benchmark harness for the resolver.
//!
//! Uses criterion for reliable benchmarking.
//! Run with: cargo bench -p kestrel_resolver

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kestrel_core::TextSpan;
use kestrel_resolver::ResolutionContext;

fn synthetic() -> TextSpan {
    TextSpan::synthetic()
}

/// Register `count` functions, each with a few locals, a closure that
/// captures one of them and a handful of lookups.
fn resolve_functions(count: usize) -> ResolutionContext {
    let mut ctx = ResolutionContext::new();
    for i in 0..count {
        ctx.register_func(&format!("f{}", i), synthetic(), 2);
        ctx.register_arg("a", synthetic());
        ctx.register_arg("b", synthetic());
        ctx.register_local_var("total", synthetic());
        let t = ctx.acquire_temp();
        ctx.release_temp(t);
        ctx.register_literal("step", synthetic(), 1, &[]);
        let total = ctx.name("total", synthetic());
        let _ = ctx.resolve_storage(&total);
        ctx.leave_scope();
        let a = ctx.name("a", synthetic());
        let _ = ctx.resolve_storage(&a);
        ctx.leave_scope();
    }
    ctx
}

/// Build a chain of `depth` classes, each overriding the same two methods.
fn resolve_class_chain(depth: usize) -> ResolutionContext {
    let mut ctx = ResolutionContext::new();
    for i in 0..depth {
        ctx.register_class(&format!("C{}", i), synthetic());
        let parent = (i > 0).then(|| ctx.name(&format!("C{}", i - 1), synthetic()));
        let _ = ctx.derive_members(parent.as_ref());
        let _ = ctx.register_member(&format!("field{}", i), synthetic());
        for method in ["update", "draw"] {
            let _ = ctx.register_method(method, synthetic(), 0);
            ctx.leave_scope();
        }
        ctx.leave_scope();
    }
    ctx
}

// ============================================================================
// Registration Benchmarks
// ============================================================================

fn bench_functions(c: &mut Criterion) {
    let mut group = c.benchmark_group("functions");
    for count in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(resolve_functions(black_box(count))));
        });
    }
    group.finish();
}

fn bench_class_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("class_chain");
    for depth in [5, 25, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.iter(|| black_box(resolve_class_chain(black_box(depth))));
        });
    }
    group.finish();
}

// ============================================================================
// Image Benchmarks
// ============================================================================

fn bench_image(c: &mut Criterion) {
    let mut group = c.benchmark_group("image");
    let ctx = resolve_functions(500);
    let bytes = ctx.export().unwrap();

    group.bench_function("export", |b| {
        b.iter(|| black_box(ctx.export().unwrap()));
    });

    group.bench_function("import", |b| {
        b.iter(|| black_box(ResolutionContext::import(black_box(&bytes)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_functions, bench_class_chain, bench_image);
criterion_main!(benches);
