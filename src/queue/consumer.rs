//! C7 — Queue Consumer (§4.7).
//!
//! One long-running pop loop with a dedicated `BRPOP` connection and a
//! dedicated inspection connection, a `parking_lot::Mutex`-guarded state
//! flag (the teacher's choice of `parking_lot` for short, uncontended
//! critical sections), and a `JoinSet` tracking in-flight handlers for the
//! drain on `stop()`.

use crate::dispatch::EventDispatcher;
use crate::error::BridgeError;
use crate::queue::event;
use parking_lot::Mutex as SyncMutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connecting,
    Running,
    Draining,
    Stopped,
}

pub struct QueueConsumer {
    queue_name: String,
    pop_conn: ConnectionManager,
    inspect_conn: ConnectionManager,
    dispatcher: Arc<EventDispatcher>,
    state: SyncMutex<ConsumerState>,
    in_flight: AsyncMutex<JoinSet<()>>,
    poll_interval: Duration,
    block_timeout: Duration,
}

impl QueueConsumer {
    #[must_use]
    pub fn new(
        queue_name: impl Into<String>,
        pop_conn: ConnectionManager,
        inspect_conn: ConnectionManager,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            pop_conn,
            inspect_conn,
            dispatcher,
            state: SyncMutex::new(ConsumerState::Idle),
            in_flight: AsyncMutex::new(JoinSet::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }

    /// Queue depth via `LLEN` on the inspection connection.
    pub async fn queue_len(&self) -> Result<i64, BridgeError> {
        let mut conn = self.inspect_conn.clone();
        conn.llen(&self.queue_name)
            .await
            .map_err(|e| BridgeError::transient("redis", e))
    }

    /// Transition `Idle → Connecting → Running` and spawn the pop loop.
    ///
    /// # Errors
    /// Returns [`BridgeError::Startup`] if already running.
    pub fn start(self: &Arc<Self>) -> Result<(), BridgeError> {
        {
            let mut state = self.state.lock();
            if *state == ConsumerState::Running {
                return Err(BridgeError::Startup("consumer is already running".to_string()));
            }
            *state = ConsumerState::Connecting;
        }

        *self.state.lock() = ConsumerState::Running;
        info!(queue = %self.queue_name, "queue consumer started");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_loop().await;
        });

        Ok(())
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            if self.state() != ConsumerState::Running {
                break;
            }

            match self.pop_once().await {
                Ok(Some(raw)) => self.handle_raw(raw).await,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "queue pop failed, will retry after backoff"),
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        *self.state.lock() = ConsumerState::Stopped;
        info!(queue = %self.queue_name, "queue consumer stopped");
    }

    async fn pop_once(&self) -> Result<Option<String>, BridgeError> {
        let mut conn = self.pop_conn.clone();

        // The block timeout is passed to BRPOP itself so Redis gives up
        // server-side at the same instant the client does. A client-side
        // `tokio::time::timeout` wrapping an indefinite BRPOP would only
        // drop the future, leaving the blocking pop queued on the
        // connection — the next iteration's BRPOP then queues behind it,
        // and replies can be handed to an already-abandoned poll.
        let popped = conn
            .brpop::<_, Option<(String, String)>>(self.queue_name.clone(), self.block_timeout.as_secs_f64())
            .await;

        match popped {
            Ok(Some((_key, value))) => Ok(Some(value)),
            Ok(None) => Ok(None),
            Err(e) => Err(BridgeError::transient("redis", e)),
        }
    }

    async fn handle_raw(self: &Arc<Self>, raw: String) {
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "malformed webhook event json, dropping");
                return;
            }
        };

        let Some(event) = event::validate(&value) else {
            warn!("webhook event failed structural validation, dropping");
            return;
        };

        debug!(conversation_id = %event.conversation_id, "dispatching webhook event");
        let dispatcher = Arc::clone(&self.dispatcher);
        let conversation_id = event.conversation_id.clone();

        let mut in_flight = self.in_flight.lock().await;
        in_flight.spawn(async move {
            if let Err(e) = dispatcher.dispatch(event).await {
                warn!(conversation_id = %conversation_id, error = %e, "handler failed");
            }
        });
    }

    /// Transition `Running → Draining → Stopped`, awaiting in-flight
    /// handlers up to 30s (§4.7/§5).
    pub async fn stop(&self) {
        *self.state.lock() = ConsumerState::Draining;
        info!(queue = %self.queue_name, "queue consumer draining");

        let drain = async {
            loop {
                let mut in_flight = self.in_flight.lock().await;
                if in_flight.is_empty() {
                    break;
                }
                let _ = in_flight.join_next().await;
            }
        };

        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            let remaining = self.in_flight.lock().await.len();
            warn!(remaining, "drain timeout reached, some handlers leaked");
        }

        *self.state.lock() = ConsumerState::Stopped;
    }
}
