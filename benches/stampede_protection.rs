//! Benchmarks the in-flight request-coalescing guard on the engine's cold
//! read path (§4.4) — many concurrent readers of the same cold key should
//! collapse onto one L3 round-trip.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::runtime::Runtime;
use unthread_storage_bridge::tiers::{DurableTier, L1Cache, L2Cache};
use unthread_storage_bridge::{Config, UnifiedStorageEngine};

fn setup() -> (Arc<UnifiedStorageEngine>, Runtime) {
    let rt = Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"));
    let engine = rt.block_on(async {
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
    });
    (Arc::new(engine), rt)
}

fn bench_stampede(c: &mut Criterion) {
    let (engine, rt) = setup();

    c.bench_function("stampede_100_concurrent_cold_reads", |b| {
        b.iter(|| {
            rt.block_on(async {
                let key = format!("bench:stampede:{}", rand::random::<u32>());
                engine
                    .set(&key, &json!({"seeded": true}), None)
                    .await
                    .unwrap_or_else(|_| panic!("seed write failed"));

                let mut handles = Vec::with_capacity(100);
                for _ in 0..100 {
                    let engine = Arc::clone(&engine);
                    let key = key.clone();
                    handles.push(tokio::spawn(async move {
                        engine
                            .get::<Value>(&key)
                            .await
                            .unwrap_or_else(|_| panic!("get failed"))
                    }));
                }

                for handle in handles {
                    black_box(handle.await.unwrap_or_else(|_| panic!("task panicked")));
                }
            });
        });
    });
}

criterion_group!(benches, bench_stampede);
criterion_main!(benches);
