//! Benchmarks for the three-tier read/write path (§4.4).
//!
//! Requires live backends: `POSTGRES_URL` and `PLATFORM_REDIS_URL` must
//! point at a reachable Postgres and Redis instance (same assumption the
//! stampede-protection benchmark makes).

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use unthread_storage_bridge::tiers::{DurableTier, L1Cache, L2Cache};
use unthread_storage_bridge::{Config, UnifiedStorageEngine};

fn test_data(size_bytes: usize) -> Value {
    json!({ "data": "x".repeat(size_bytes), "size": size_bytes })
}

fn build_engine(rt: &Runtime) -> UnifiedStorageEngine {
    rt.block_on(async {
        let config = Config::from_env().unwrap_or_else(|_| panic!("POSTGRES_URL/PLATFORM_REDIS_URL/WEBHOOK_REDIS_URL must be set"));
        let l1 = Arc::new(L1Cache::new(10_000));
        let l2 = Arc::new(
            L2Cache::connect(&config.platform_redis_url)
                .await
                .unwrap_or_else(|_| panic!("failed to connect L2")),
        );
        let l3 = Arc::new(
            DurableTier::connect(&config)
                .await
                .unwrap_or_else(|_| panic!("failed to connect L3")),
        );
        UnifiedStorageEngine::new(l1, l2, l3)
    })
}

fn bench_write(c: &mut Criterion) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"));
    let engine = build_engine(&rt);
    let value = test_data(1024);

    c.bench_function("engine_set", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:mt:{}", rand::random::<u32>());
                engine
                    .set(&key, &black_box(value.clone()), Some(Duration::from_secs(60)))
                    .await
                    .unwrap_or_else(|_| panic!("set failed"));
            });
        });
    });
}

fn bench_read_l1_hit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"));
    let engine = build_engine(&rt);
    let value = test_data(1024);

    rt.block_on(async {
        for i in 0..100 {
            let key = format!("bench:read:{i}");
            engine
                .set(&key, &value, Some(Duration::from_secs(60)))
                .await
                .unwrap_or_else(|_| panic!("set failed"));
        }
    });

    c.bench_function("engine_get_l1_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:read:{}", rand::random::<u8>() % 100);
                black_box(
                    engine
                        .get::<Value>(&key)
                        .await
                        .unwrap_or_else(|_| panic!("get failed")),
                );
            });
        });
    });
}

fn bench_data_size(c: &mut Criterion) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"));
    let engine = build_engine(&rt);

    let mut group = c.benchmark_group("engine_data_size");
    group.measurement_time(Duration::from_secs(10));

    for size in &[100, 1024, 10240, 102_400] {
        let data = test_data(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                rt.block_on(async {
                    let key = format!("bench:size:{}", rand::random::<u32>());
                    engine
                        .set(&key, &black_box(data.clone()), None)
                        .await
                        .unwrap_or_else(|_| panic!("set failed"));
                    black_box(
                        engine
                            .get::<Value>(&key)
                            .await
                            .unwrap_or_else(|_| panic!("get failed")),
                    );
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_read_l1_hit, bench_data_size);
criterion_main!(benches);
