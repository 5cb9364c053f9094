//! Unthread Storage Bridge
//!
//! A unified three-tier (memory / distributed / durable) storage engine and
//! webhook consumer pipeline bridging a chat platform with an external
//! ticketing platform, featuring:
//! - **L1**: in-memory, Moka-backed, strict LRU with per-entry TTL.
//! - **L2**: distributed, Redis-backed, native TTL.
//! - **L3**: durable, Postgres-backed, source of truth for every tier above it.
//! - **Cache stampede protection**: the in-flight `DashMap<String, Mutex<()>>`
//!   coalescing pattern, carried over from this crate's multi-tier-cache
//!   lineage.
//! - **Bidirectional chat-thread ↔ ticket-id mapping**, race-tolerant under
//!   cross-tier propagation lag via bounded exponential backoff.
//! - **At-least-once webhook ingestion** with graceful drain on shutdown.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use unthread_storage_bridge::{Config, StorageBridge};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     unthread_storage_bridge::telemetry::init();
//!     let config = Config::from_env()?;
//!     let bridge = StorageBridge::connect(config).await?;
//!
//!     bridge
//!         .domain
//!         .upsert_customer(&unthread_storage_bridge::CustomerUpsert {
//!             chat_user_id: "U1".to_string(),
//!             username: "alice".to_string(),
//!             ticket_customer_id: None,
//!             email: None,
//!             display_name: None,
//!             avatar_url: None,
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Queue Consumer (C7) --> Event Dispatch (C9) --> Thread Lookup w/ Retry (C8)
//!                                                         |
//!                                                         v
//!                              Domain Store (C5) --> Unified Storage Engine (C4)
//!                                                         |
//!                                        L1 (memory) -> L2 (redis) -> L3 (postgres)
//! ```

use std::sync::Arc;

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod lookup;
pub mod metrics;
pub mod queue;
pub mod schema;
pub mod telemetry;
pub mod tiers;
pub mod traits;

pub use config::{Config, SslMode};
pub use dispatch::{ChatPlatform, ChatThread, EventDispatcher, TicketPlatform};
pub use domain::{CachePattern, Customer, CustomerUpsert, DomainStore, MappingStatus, MappingUpsert, ThreadTicketMapping};
pub use engine::{Layer, StorageGet, UnifiedStorageEngine};
pub use error::{BridgeError, RetryContext};
pub use lookup::RetryPolicy;
pub use queue::{ConsumerState, EventType, QueueConsumer, WebhookEvent};
pub use tiers::{DurableTier, L1Cache, L2Cache};

use redis::aio::ConnectionManager;
use std::collections::HashMap;

/// Default L1 capacity (entry count), matching the teacher's default
/// `MokaCache` sizing.
const DEFAULT_L1_CAPACITY: u64 = 10_000;

/// Top-level wiring of config → tiers → engine → domain store (§2 control
/// flow). Constructed once at process startup and held by the caller; no
/// module-level singleton, no global lookup (Design Notes §9).
pub struct StorageBridge {
    pub config: Config,
    pub engine: Arc<UnifiedStorageEngine>,
    pub domain: Arc<DomainStore>,
    pub durable: Arc<DurableTier>,
}

impl StorageBridge {
    /// Connect all three tiers and run schema bootstrap (§4.6).
    ///
    /// # Errors
    /// Returns [`BridgeError::Startup`] if any tier fails to connect or
    /// schema bootstrap fails.
    pub async fn connect(config: Config) -> Result<Self, BridgeError> {
        let l1 = Arc::new(L1Cache::new(DEFAULT_L1_CAPACITY));
        let l2 = Arc::new(L2Cache::connect(&config.platform_redis_url).await?);
        let l3 = Arc::new(DurableTier::connect(&config).await?);

        schema::bootstrap(&l3).await?;

        let engine = Arc::new(UnifiedStorageEngine::with_debug_mode(
            l1,
            l2,
            Arc::clone(&l3),
            config.debug_mode,
        ));
        let domain = Arc::new(DomainStore::new(Arc::clone(&engine), Arc::clone(&l3)));

        Ok(Self {
            config,
            engine,
            domain,
            durable: l3,
        })
    }

    /// Build the webhook queue consumer (§4.7), wiring in the caller's
    /// chat/ticket platform capability handles (§9).
    ///
    /// # Errors
    /// Returns [`BridgeError::Startup`] if the webhook Redis connections
    /// cannot be established.
    pub async fn build_consumer(
        &self,
        queue_name: impl Into<String>,
        chat: Arc<dyn ChatPlatform>,
        ticket: Arc<dyn TicketPlatform>,
    ) -> Result<Arc<QueueConsumer>, BridgeError> {
        let client = redis::Client::open(self.config.webhook_redis_url.as_str())
            .map_err(|e| BridgeError::Startup(format!("invalid webhook redis url: {e}")))?;

        let pop_conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BridgeError::Startup(format!("webhook pop connection failed: {e}")))?;
        let inspect_conn = ConnectionManager::new(client)
            .await
            .map_err(|e| BridgeError::Startup(format!("webhook inspect connection failed: {e}")))?;

        let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&self.domain), chat, ticket));
        Ok(Arc::new(QueueConsumer::new(
            queue_name,
            pop_conn,
            inspect_conn,
            dispatcher,
        )))
    }

    /// Per-tier health map (§4.4).
    pub async fn health_check(&self) -> HashMap<&'static str, bool> {
        self.engine.health_check().await
    }
}
