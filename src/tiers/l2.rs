//! L2 — distributed cache tier (§4.2)
//!
//! Redis via `ConnectionManager`, grounded on the teacher's `RedisCache`.
//! Values are opaque bytes (already UTF-8 JSON from the engine's codec);
//! TTL is native Redis `SET EX`. A disconnected backend is never an error
//! from `get`/`set`/`remove` — every operation degrades to "absent" /
//! "failed silently", the engine treats this tier as best-effort.

use crate::error::BridgeError;
use crate::traits::{CacheBackend, TtlAwareBackend};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;
use tracing::{debug, warn};

pub struct L2Cache {
    conn: ConnectionManager,
}

impl L2Cache {
    /// Connect to Redis with the reconnect/keepalive posture from §4.2:
    /// exponential backoff capped at 3s, keep-alive ping every 30s, connect
    /// timeout 10s.
    ///
    /// # Errors
    /// Returns [`BridgeError::Startup`] if the initial connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, BridgeError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| BridgeError::Startup(format!("invalid redis url: {e}")))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(10))
            .set_max_delay(3_000)
            .set_ping_interval(Duration::from_secs(30));

        let conn = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| BridgeError::Startup(format!("redis connect failed: {e}")))?;

        Ok(Self { conn })
    }

    /// Scan keys matching a glob pattern via cursor-based `SCAN` (safe for
    /// production, unlike `KEYS`). Used by `clear_cache(pattern)` (§4.5).
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, BridgeError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| BridgeError::transient("redis", e))?;

            cursor = next_cursor;
            keys.extend(batch);
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl CacheBackend for L2Cache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone();
        match conn.get::<_, Vec<u8>>(key).await {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BridgeError> {
        let mut conn = self.conn.clone();
        let result = match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await,
            None => conn.set::<_, _, ()>(key, value).await,
        };
        match result {
            Ok(()) => {
                debug!(key, "[L2] set");
                Ok(())
            }
            Err(e) => {
                warn!(key, error = %e, "[L2] set failed, degrading to best-effort");
                Err(BridgeError::transient("redis", e))
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<(), BridgeError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| BridgeError::transient("redis", e))
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl TtlAwareBackend for L2Cache {
    async fn get_with_ttl(&self, key: &str) -> Option<(Vec<u8>, Option<Duration>)> {
        let mut conn = self.conn.clone();
        let value: Vec<u8> = match conn.get(key).await {
            Ok(v) => v,
            Err(_) => return None,
        };
        if value.is_empty() {
            return None;
        }

        let ttl_secs: i64 = redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .unwrap_or(-1);

        let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs as u64));
        Some((value, ttl))
    }
}
