//! Error taxonomy (§7)
//!
//! A tagged variant per failure class so callers can match on the tag to
//! decide logging severity and retry behavior, rather than downcasting a
//! class hierarchy (Design Notes §9, "Typed errors via class hierarchy").

use std::time::Duration;
use thiserror::Error;

/// Context carried on the mapping-not-found variant so callers can classify
/// whether the failure looks like an ordinary propagation race (§4.8/P6).
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub ticket_id: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub window: Duration,
}

impl RetryContext {
    #[must_use]
    pub fn likely_race_condition(&self) -> bool {
        self.elapsed < self.window
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Connect/timeout/network failure at a specific tier. Individual cache
    /// operations never bubble this up as an error — it only surfaces from
    /// explicit health checks or the durable tier, which is the source of
    /// truth and cannot fail silently.
    #[error("transient failure in {tier}: {source}")]
    Transient {
        tier: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A unique-constraint violation on the durable tier that an ON
    /// CONFLICT upsert didn't absorb.
    #[error("durable constraint violation: {0}")]
    DurableConstraint(String),

    /// Ticket→thread mapping was not found within the retry window (§4.8).
    #[error("mapping not found for ticket {} after {} attempts ({:?} elapsed)", .0.ticket_id, .0.attempts, .0.elapsed)]
    MappingNotFound(RetryContext),

    /// A webhook payload failed structural validation (§6/§7). Always
    /// logged at warn and dropped; never retried internally.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A dispatched handler failed. The event is lost by design — at-least
    /// once delivery assumes an idempotent, retrying producer.
    #[error("handler failed for conversation {conversation_id}: {source}")]
    HandlerFailed {
        conversation_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Fatal startup condition: missing env contract, schema bootstrap
    /// timeout, or durable connect failure. The process should exit
    /// non-zero.
    #[error("startup failed: {0}")]
    Startup(String),
}

impl BridgeError {
    #[must_use]
    pub fn transient(tier: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Transient {
            tier,
            source: source.into(),
        }
    }
}
