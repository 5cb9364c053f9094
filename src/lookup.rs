//! C8 — Thread-Lookup with Retry (§4.8).
//!
//! Absorbs propagation lag between a mapping being durably written and it
//! becoming visible to whichever reader processes the webhook that
//! references it. Retries only the "mapping not found" failure mode; a
//! chat-platform error raises immediately.

use crate::dispatch::{ChatPlatform, ChatThread};
use crate::domain::store::DomainStore;
use crate::error::{BridgeError, RetryContext};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window: Duration::from_secs(10),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = 2u32.saturating_pow(attempt.saturating_sub(1));
    let base = policy.base_delay.saturating_mul(exp);
    let jitter_max = policy.base_delay.mul_f64(0.1);
    let jitter = if jitter_max.is_zero() {
        Duration::ZERO
    } else {
        rand::thread_rng().gen_range(Duration::ZERO..=jitter_max)
    };
    (base + jitter).min(policy.max_delay)
}

/// # Errors
/// Returns [`BridgeError::MappingNotFound`] after exhausting `policy.max_attempts`,
/// or whatever [`ChatPlatform::fetch_thread`] returns, wrapped as
/// [`BridgeError::HandlerFailed`] — that path is never retried.
pub async fn find_thread_by_ticket_with_retry(
    domain: &DomainStore,
    chat: &dyn ChatPlatform,
    ticket_id: &str,
    policy: &RetryPolicy,
) -> Result<ChatThread, BridgeError> {
    let started = Instant::now();

    for attempt in 1..=policy.max_attempts {
        match domain.get_mapping_by_ticket(ticket_id).await? {
            Some(mapping) => {
                let thread = chat
                    .fetch_thread(&mapping.chat_thread_id)
                    .await
                    .map_err(|source| BridgeError::HandlerFailed {
                        conversation_id: ticket_id.to_string(),
                        source,
                    })?;

                if !thread.is_thread {
                    return Err(BridgeError::HandlerFailed {
                        conversation_id: ticket_id.to_string(),
                        source: anyhow::anyhow!(
                            "fetched channel {} is not a thread",
                            mapping.chat_thread_id
                        ),
                    });
                }

                return Ok(thread);
            }
            None if attempt < policy.max_attempts => {
                let delay = backoff_delay(policy, attempt);
                tokio::time::sleep(delay).await;
            }
            None => break,
        }
    }

    let elapsed = started.elapsed();
    let ctx = RetryContext {
        ticket_id: ticket_id.to_string(),
        attempts: policy.max_attempts,
        elapsed,
        window: policy.window,
    };
    if ctx.likely_race_condition() {
        warn!(ticket_id, attempts = ctx.attempts, "mapping lookup exhausted retries, likely a propagation race");
    }
    Err(BridgeError::MappingNotFound(ctx))
}
