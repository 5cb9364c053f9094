//! Shared integration-test infrastructure.
//!
//! Mirrors the teacher's `tests/common/mod.rs` shape: env-driven backend
//! URLs, a unique key/id generator, and a `skip_unless_live_backends!` guard
//! so these tests no-op in environments without a reachable Postgres/Redis
//! (CI without services, a contributor's laptop) rather than failing.

use unthread_storage_bridge::{Config, DurableTier, L1Cache, L2Cache, StorageBridge};

/// True when `POSTGRES_URL`, `PLATFORM_REDIS_URL`, and `WEBHOOK_REDIS_URL`
/// are all set, i.e. live-backend integration tests can run.
pub fn live_backends_available() -> bool {
    std::env::var("POSTGRES_URL").is_ok()
        && std::env::var("PLATFORM_REDIS_URL").is_ok()
        && std::env::var("WEBHOOK_REDIS_URL").is_ok()
}

/// A unique test identifier to avoid collisions between concurrent test
/// runs against a shared database.
pub fn unique_id(label: &str) -> String {
    format!("{label}-{}", rand::random::<u64>())
}

/// Build a fully-connected [`StorageBridge`] against the env-configured
/// backends, running schema bootstrap.
pub async fn connected_bridge() -> StorageBridge {
    let config = Config::from_env().expect("env contract must be set for live tests");
    StorageBridge::connect(config)
        .await
        .expect("failed to connect storage bridge")
}

/// Build the three tiers directly (bypassing `StorageBridge`) for tests
/// that need to drop/clear an individual tier mid-test (P1/S1).
pub async fn connected_tiers() -> (L1Cache, L2Cache, DurableTier) {
    let config = Config::from_env().expect("env contract must be set for live tests");
    let l1 = L1Cache::new(10_000);
    let l2 = L2Cache::connect(&config.platform_redis_url)
        .await
        .expect("failed to connect L2");
    let l3 = DurableTier::connect(&config)
        .await
        .expect("failed to connect L3");
    (l1, l2, l3)
}
