//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use pipeflow::events::NoOpEventSink;
use pipeflow::observability::NoOpStatistics;
use pipeflow::prelude::*;
use pipeflow::testing::{CountingPipe, EchoPipe};

fn services() -> Arc<EngineServices> {
    Arc::new(
        EngineServices::default()
            .with_events(Arc::new(NoOpEventSink))
            .with_statistics(Arc::new(NoOpStatistics)),
    )
}

fn linear_pipeline(name: &str, length: usize) -> PipeLine {
    (0..length)
        .fold(PipeLine::builder(name), |builder, i| {
            builder.with_pipe(PipeSpec::new(EchoPipe::new(format!("pipe-{i}"))))
        })
        .build()
        .unwrap_or_else(|e| panic!("invalid bench pipeline: {e}"))
}

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| panic!("no runtime: {e}"));

    let single = Adapter::new(linear_pipeline("single", 1), services());
    c.bench_function("single_pipe", |b| {
        b.iter(|| runtime.block_on(single.process(black_box("hello"))));
    });

    let ten = Adapter::new(linear_pipeline("ten", 10), services());
    c.bench_function("ten_pipes", |b| {
        b.iter(|| runtime.block_on(ten.process(black_box("hello"))));
    });

    let cached = Adapter::new(
        PipeLine::builder("cached")
            .with_pipe(PipeSpec::new(CountingPipe::new("upper")))
            .with_cache(Arc::new(InMemoryCache::new("bench")))
            .build()
            .unwrap_or_else(|e| panic!("invalid bench pipeline: {e}")),
        services(),
    );
    c.bench_function("cache_hit", |b| {
        b.iter(|| runtime.block_on(cached.process(black_box("hello"))));
    });

    let limited = Adapter::new(
        PipeLine::builder("limited")
            .with_pipe(
                PipeSpec::new(EchoPipe::new("echo"))
                    .with_settings(PipeSettings::new().with_max_threads(4)),
            )
            .with_transaction(Propagation::Required, None)
            .build()
            .unwrap_or_else(|e| panic!("invalid bench pipeline: {e}")),
        services(),
    );
    c.bench_function("limited_transactional_pipe", |b| {
        b.iter(|| runtime.block_on(limited.process(black_box("hello"))));
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
