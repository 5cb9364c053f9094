//! Cache backend and capability traits
//!
//! `CacheBackend`/`TtlAwareBackend` are carried over from the multi-tier-cache
//! lineage this crate is built on: a pluggable abstraction so L1/L2/L3 share
//! one interface and the engine above them never special-cases a tier.

use crate::error::BridgeError;
use async_trait::async_trait;
use std::time::Duration;

/// Core cache backend trait shared by all three tiers.
///
/// Values cross this boundary as raw bytes (UTF-8 JSON). The tier is opaque
/// to payload shape; encoding/decoding is the engine's job.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value by key. Absent or expired both read as `None`.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value with a time-to-live. `None` means "never expires".
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BridgeError>;

    /// Remove a value. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), BridgeError>;

    /// Verify the backend is reachable and operational.
    async fn health_check(&self) -> bool;

    /// Name used in logs and the tier health map.
    fn name(&self) -> &'static str;
}

/// Extension for tiers that can report the remaining TTL alongside a value.
///
/// Needed so a read-through warm-back (§4.4) can propagate the *original*
/// expiry into the tier above rather than resetting a fresh TTL window.
#[async_trait]
pub trait TtlAwareBackend: CacheBackend {
    async fn get_with_ttl(&self, key: &str) -> Option<(Vec<u8>, Option<Duration>)>;
}
