//! Discovery benchmarks for lodestar

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use lodestar::{
    Balancer, CancellationToken, ClientOptions, InMemoryStore, LoadBalancingStrategy, Logger,
    RandomBalancer, RegistryClient, RoundRobinBalancer, ServiceRecord,
};
use std::hint::black_box;

fn records(count: usize) -> Vec<ServiceRecord> {
    (0..count)
        .map(|i| {
            ServiceRecord::new("chat", format!("10.0.{}.{}:9000", i / 256, i % 256)).with_defaults()
        })
        .collect()
}

fn balancer_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("balancer_select");
    group.throughput(Throughput::Elements(1));

    for size in [2usize, 16, 256] {
        let instances = records(size);

        let random = RandomBalancer;
        group.bench_with_input(BenchmarkId::new("random", size), &instances, |b, instances| {
            b.iter(|| black_box(random.select("chat", instances)));
        });

        let round_robin = RoundRobinBalancer::new();
        group.bench_with_input(BenchmarkId::new("round_robin", size), &instances, |b, instances| {
            b.iter(|| black_box(round_robin.select("chat", instances)));
        });
    }

    group.finish();
}

fn record_codec_benchmark(c: &mut Criterion) {
    let record = ServiceRecord::new("chat", "10.0.0.1:9000").with_defaults();
    let encoded = record.encode().unwrap();

    let mut group = c.benchmark_group("record_codec");
    group.throughput(Throughput::Bytes(encoded.len() as u64));

    group.bench_function("encode", |b| {
        b.iter(|| black_box(record.encode().unwrap()));
    });

    group.bench_function("decode", |b| {
        b.iter(|| black_box(ServiceRecord::decode(encoded.as_bytes()).unwrap()));
    });

    group.finish();
}

fn resolve_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ctx = CancellationToken::new();

    let mut group = c.benchmark_group("get_service");
    group.throughput(Throughput::Elements(1));

    for size in [1usize, 32] {
        let client = RegistryClient::with_store(
            InMemoryStore::new(),
            ClientOptions::default()
                .with_load_balance(LoadBalancingStrategy::RoundRobin)
                .with_logger(Logger::disabled()),
        );

        // Pre-populate registry
        rt.block_on(async {
            for record in records(size) {
                client.register(&ctx, record).await.unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::new("in_memory", size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(client.get_service(&ctx, "chat").await.unwrap()) });
        });

        rt.block_on(async { client.close().await.unwrap() });
    }

    group.finish();
}

criterion_group!(
    benches,
    balancer_benchmark,
    record_codec_benchmark,
    resolve_benchmark
);
criterion_main!(benches);
