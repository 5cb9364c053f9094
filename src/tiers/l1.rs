//! L1 — in-memory tier (§4.1)
//!
//! Bounded, LRU-evicting, per-key TTL. Grounded on the teacher's
//! `MokaCache`, switched from Moka's default window-TinyLFU policy to
//! `EvictionPolicy::lru()` so capacity-exceeded eviction is the exact
//! least-recently-used key the spec's P4 requires, not an approximation.

use crate::error::BridgeError;
use crate::traits::{CacheBackend, TtlAwareBackend};
use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Convert a signed TTL-in-seconds parameter into tier semantics: zero means
/// "no expiry", negative is rejected (§4.1 edge cases).
pub fn ttl_from_secs(secs: i64) -> Result<Option<Duration>, BridgeError> {
    match secs.cmp(&0) {
        std::cmp::Ordering::Less => Err(BridgeError::Startup(format!(
            "negative TTL is not permitted: {secs}"
        ))),
        std::cmp::Ordering::Equal => Ok(None),
        std::cmp::Ordering::Greater => Ok(Some(Duration::from_secs(secs as u64))),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    ttl: Option<Duration>,
}

/// Expiry policy driving Moka's own clock: entries with `ttl = None` never
/// expire via Moka's housekeeping (absence is instead enforced by the
/// engine's logical `expires_at`, matching the "never expires" contract of
/// §3).
struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }
}

pub struct L1Cache {
    cache: Cache<String, Entry>,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl L1Cache {
    /// Build an L1 tier with the given max entry count.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .eviction_policy(moka::policy::EvictionPolicy::lru())
            .expire_after(PerEntryExpiry)
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.cache.get(key).await.is_some()
    }
}

#[async_trait]
impl CacheBackend for L1Cache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BridgeError> {
        self.cache
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_vec(),
                    ttl,
                },
            )
            .await;
        self.sets.fetch_add(1, Ordering::Relaxed);
        debug!(key, ttl_secs = ?ttl.map(|d| d.as_secs()), "[L1] set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BridgeError> {
        self.cache.remove(key).await;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl TtlAwareBackend for L1Cache {
    async fn get_with_ttl(&self, key: &str) -> Option<(Vec<u8>, Option<Duration>)> {
        self.cache.get(key).await.map(|entry| {
            self.hits.fetch_add(1, Ordering::Relaxed);
            (entry.value, entry.ttl)
        })
    }
}

/// Shareable handle, matching the `Arc<L1Cache>` shape the engine composes.
pub type SharedL1 = Arc<L1Cache>;
