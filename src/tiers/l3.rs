//! L3 — durable tier (§4.3)
//!
//! The teacher crate has no durable tier; this is grounded on the
//! `sqlx`-over-Postgres idiom used elsewhere in the reference pack
//! (`stellar-insights-backend`'s `sqlx` dependency) rather than invented
//! from nothing. Stores the generic `storage_cache` key/value table plus
//! raw-SQL access to the typed `customers` and `thread_ticket_mappings`
//! tables (§6); the typed operations themselves live in [`crate::domain`].

use crate::config::{Config, SslMode};
use crate::domain::customers::{Customer, CustomerUpsert};
use crate::domain::mappings::{MappingUpsert, ThreadTicketMapping};
use crate::error::BridgeError;
use crate::traits::{CacheBackend, TtlAwareBackend};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const STATEMENT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct DurableTier {
    pool: PgPool,
}

impl DurableTier {
    /// Connect a pool sized per §4.3: max 10 connections, 30s idle timeout.
    /// SSL posture is derived from [`Config::ssl_mode`].
    ///
    /// # Errors
    /// Returns [`BridgeError::Startup`] if the pool cannot be established.
    pub async fn connect(config: &Config) -> Result<Self, BridgeError> {
        let mut options = PgConnectOptions::from_str(&config.postgres_url)
            .map_err(|e| BridgeError::Startup(format!("invalid postgres url: {e}")))?;

        options = match config.ssl_mode() {
            SslMode::Disabled => options.ssl_mode(PgSslMode::Disable),
            SslMode::Strict => options.ssl_mode(PgSslMode::VerifyFull),
            SslMode::Relaxed | SslMode::PlatformDefault => {
                options.ssl_mode(PgSslMode::Require)
            }
        };
        if let Some(ca) = &config.database_ssl_ca {
            options = options.ssl_root_cert_from_pem(ca.clone().into_bytes());
        }

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .idle_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| BridgeError::Startup(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_statement_timeout<F, T>(&self, op: F) -> Result<T, BridgeError>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        tokio::time::timeout(STATEMENT_TIMEOUT, op)
            .await
            .map_err(|_| BridgeError::transient("postgres", anyhow::anyhow!("query timed out")))?
            .map_err(|e| BridgeError::transient("postgres", e))
    }

    /// Delete expired rows from `storage_cache` via the bundled stored
    /// procedure (§4.3/§6). Returns the count removed.
    ///
    /// # Errors
    /// Returns [`BridgeError::Transient`] on query failure.
    pub async fn sweep(&self) -> Result<i64, BridgeError> {
        let row = self
            .with_statement_timeout(
                sqlx::query("SELECT cleanup_expired_cache() AS removed").fetch_one(&self.pool),
            )
            .await?;
        let removed: i64 = row.try_get("removed").unwrap_or(0);
        debug!(removed, "[L3] swept expired cache rows");
        Ok(removed)
    }

    /// Upsert keyed on `chat_user_id`. Absent fields never overwrite present
    /// ones (§4.5, COALESCE semantics); `ticket_customer_id` is immutable
    /// once set.
    ///
    /// # Errors
    /// Returns [`BridgeError::DurableConstraint`] on a unique violation not
    /// absorbed by the `ON CONFLICT` clause, [`BridgeError::Transient`]
    /// otherwise.
    pub async fn upsert_customer(&self, c: &CustomerUpsert) -> Result<Customer, BridgeError> {
        self.with_statement_timeout(
            sqlx::query_as::<_, Customer>(
                "INSERT INTO customers \
                    (chat_user_id, username, ticket_customer_id, email, display_name, avatar_url, \
                     created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, now(), now()) \
                 ON CONFLICT (chat_user_id) DO UPDATE SET \
                    username = EXCLUDED.username, \
                    ticket_customer_id = COALESCE(customers.ticket_customer_id, EXCLUDED.ticket_customer_id), \
                    email = COALESCE(EXCLUDED.email, customers.email), \
                    display_name = COALESCE(EXCLUDED.display_name, customers.display_name), \
                    avatar_url = COALESCE(EXCLUDED.avatar_url, customers.avatar_url), \
                    updated_at = now() \
                 RETURNING id, chat_user_id, ticket_customer_id, email, username, display_name, \
                           avatar_url, created_at, updated_at",
            )
            .bind(&c.chat_user_id)
            .bind(&c.username)
            .bind(&c.ticket_customer_id)
            .bind(&c.email)
            .bind(&c.display_name)
            .bind(&c.avatar_url)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| match &e {
            BridgeError::Transient { source, .. }
                if source.to_string().contains("unique constraint") =>
            {
                BridgeError::DurableConstraint(source.to_string())
            }
            _ => e,
        })
    }

    pub async fn find_customer_by_chat_id(&self, chat_user_id: &str) -> Option<Customer> {
        self.with_statement_timeout(
            sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE chat_user_id = $1")
                .bind(chat_user_id)
                .fetch_optional(&self.pool),
        )
        .await
        .ok()
        .flatten()
    }

    pub async fn find_customer_by_ticket_id(&self, ticket_customer_id: &str) -> Option<Customer> {
        self.with_statement_timeout(
            sqlx::query_as::<_, Customer>(
                "SELECT * FROM customers WHERE ticket_customer_id = $1",
            )
            .bind(ticket_customer_id)
            .fetch_optional(&self.pool),
        )
        .await
        .ok()
        .flatten()
    }

    /// Upsert keyed on `chat_thread_id`. `ticket_id` carries a separate
    /// unique constraint (I1); a genuine collision surfaces as
    /// [`BridgeError::DurableConstraint`].
    ///
    /// # Errors
    /// Returns [`BridgeError::DurableConstraint`] on a unique violation,
    /// [`BridgeError::Transient`] otherwise.
    pub async fn upsert_mapping(
        &self,
        m: &MappingUpsert,
    ) -> Result<ThreadTicketMapping, BridgeError> {
        self.with_statement_timeout(
            sqlx::query_as::<_, ThreadTicketMapping>(
                "INSERT INTO thread_ticket_mappings \
                    (chat_thread_id, ticket_id, chat_channel_id, customer_id, status, \
                     created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, now(), now()) \
                 ON CONFLICT (chat_thread_id) DO UPDATE SET \
                    ticket_id = EXCLUDED.ticket_id, \
                    chat_channel_id = COALESCE(EXCLUDED.chat_channel_id, thread_ticket_mappings.chat_channel_id), \
                    customer_id = COALESCE(EXCLUDED.customer_id, thread_ticket_mappings.customer_id), \
                    status = EXCLUDED.status, \
                    updated_at = now() \
                 RETURNING id, chat_thread_id, ticket_id, chat_channel_id, customer_id, status, \
                           created_at, updated_at",
            )
            .bind(&m.chat_thread_id)
            .bind(&m.ticket_id)
            .bind(&m.chat_channel_id)
            .bind(m.customer_id)
            .bind(m.status)
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|e| match &e {
            BridgeError::Transient { source, .. }
                if source.to_string().contains("unique constraint") =>
            {
                BridgeError::DurableConstraint(source.to_string())
            }
            _ => e,
        })
    }

    pub async fn find_mapping_by_thread(&self, chat_thread_id: &str) -> Option<ThreadTicketMapping> {
        self.with_statement_timeout(
            sqlx::query_as::<_, ThreadTicketMapping>(
                "SELECT * FROM thread_ticket_mappings WHERE chat_thread_id = $1",
            )
            .bind(chat_thread_id)
            .fetch_optional(&self.pool),
        )
        .await
        .ok()
        .flatten()
    }

    pub async fn find_mapping_by_ticket(&self, ticket_id: &str) -> Option<ThreadTicketMapping> {
        self.with_statement_timeout(
            sqlx::query_as::<_, ThreadTicketMapping>(
                "SELECT * FROM thread_ticket_mappings WHERE ticket_id = $1",
            )
            .bind(ticket_id)
            .fetch_optional(&self.pool),
        )
        .await
        .ok()
        .flatten()
    }
}

#[async_trait]
impl CacheBackend for DurableTier {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let result = self
            .with_statement_timeout(
                sqlx::query(
                    "SELECT data FROM storage_cache \
                     WHERE cache_key = $1 AND (expires_at IS NULL OR expires_at > now())",
                )
                .bind(key)
                .fetch_optional(&self.pool),
            )
            .await;

        match result {
            Ok(Some(row)) => row
                .try_get::<serde_json::Value, _>("data")
                .ok()
                .and_then(|v| serde_json::to_vec(&v).ok()),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "[L3] get failed");
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
        let json: serde_json::Value = serde_json::from_slice(value)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(value).into()));
        let ttl_secs = ttl.map(|d| d.as_secs() as i64);

        self.with_statement_timeout(
            sqlx::query(
                "INSERT INTO storage_cache (cache_key, data, expires_at, updated_at) \
                 VALUES ($1, $2, CASE WHEN $3::bigint IS NULL THEN NULL \
                                      ELSE now() + make_interval(secs => $3) END, now()) \
                 ON CONFLICT (cache_key) DO UPDATE \
                 SET data = EXCLUDED.data, expires_at = EXCLUDED.expires_at, updated_at = now()",
            )
            .bind(key)
            .bind(&json)
            .bind(ttl_secs)
            .execute(&self.pool),
        )
        .await?;
        debug!(key, "[L3] set");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), BridgeError> {
        self.with_statement_timeout(
            sqlx::query("DELETE FROM storage_cache WHERE cache_key = $1")
                .bind(key)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl TtlAwareBackend for DurableTier {
    async fn get_with_ttl(&self, key: &str) -> Option<(Vec<u8>, Option<Duration>)> {
        let row = self
            .with_statement_timeout(
                sqlx::query(
                    "SELECT data, \
                            EXTRACT(EPOCH FROM (expires_at - now()))::bigint AS remaining_secs \
                     FROM storage_cache \
                     WHERE cache_key = $1 AND (expires_at IS NULL OR expires_at > now())",
                )
                .bind(key)
                .fetch_optional(&self.pool),
            )
            .await
            .ok()
            .flatten()?;

        let data: serde_json::Value = row.try_get("data").ok()?;
        let bytes = serde_json::to_vec(&data).ok()?;
        let remaining: Option<i64> = row.try_get("remaining_secs").ok().flatten();
        let ttl = remaining
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64));

        Some((bytes, ttl))
    }
}
