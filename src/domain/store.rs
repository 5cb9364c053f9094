//! `DomainStore` (C5) — typed operations on top of C4 and C3 (§4.5).
//!
//! Keys follow the strict namespacing discipline of §6. Every read/write
//! pair here is grounded on the teacher's builder-composed `CacheManager`
//! usage in `builder.rs`, generalized from opaque cache keys to the typed
//! customer/mapping entities this spec adds.

use crate::domain::customers::{Customer, CustomerUpsert};
use crate::domain::mappings::{MappingUpsert, ThreadTicketMapping};
use crate::engine::{Layer, UnifiedStorageEngine};
use crate::error::BridgeError;
use crate::tiers::DurableTier;
use std::sync::Arc;
use tracing::warn;

fn customer_chat_key(chat_user_id: &str) -> String {
    format!("customer:chat:{chat_user_id}")
}

fn customer_ticket_key(ticket_customer_id: &str) -> String {
    format!("customer:ticket:{ticket_customer_id}")
}

fn mapping_thread_key(chat_thread_id: &str) -> String {
    format!("mapping:thread:{chat_thread_id}")
}

fn mapping_ticket_key(ticket_id: &str) -> String {
    format!("mapping:ticket:{ticket_id}")
}

/// Enumerated cache namespaces accepted by [`DomainStore::clear_cache`] —
/// validated against this set rather than a raw key string, so callers
/// cannot inject an arbitrary pattern into the key space (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePattern {
    CustomerChat,
    CustomerTicket,
    MappingThread,
    MappingTicket,
    BotConfig,
}

pub struct DomainStore {
    engine: Arc<UnifiedStorageEngine>,
    durable: Arc<DurableTier>,
}

impl DomainStore {
    #[must_use]
    pub fn new(engine: Arc<UnifiedStorageEngine>, durable: Arc<DurableTier>) -> Self {
        Self { engine, durable }
    }

    /// # Errors
    /// Propagates a durable-tier failure from the typed upsert; the cache
    /// mirror writes that follow are logged, never raised (§4.5).
    pub async fn upsert_customer(&self, upsert: &CustomerUpsert) -> Result<Customer, BridgeError> {
        let customer = self.durable.upsert_customer(upsert).await?;

        let chat_key = customer_chat_key(&customer.chat_user_id);
        let ticket_key = customer
            .ticket_customer_id
            .as_deref()
            .map(customer_ticket_key);

        let chat_write = self.engine.set(&chat_key, &customer, None);
        match ticket_key {
            Some(ref tk) => {
                let ticket_write = self.engine.set(tk, &customer, None);
                let (chat_res, ticket_res) = tokio::join!(chat_write, ticket_write);
                if let Err(e) = chat_res {
                    warn!(key = %chat_key, error = %e, "failed to mirror customer cache key");
                }
                if let Err(e) = ticket_res {
                    warn!(key = %tk, error = %e, "failed to mirror customer cache key");
                }
            }
            None => {
                if let Err(e) = chat_write.await {
                    warn!(key = %chat_key, error = %e, "failed to mirror customer cache key");
                }
            }
        }

        Ok(customer)
    }

    /// # Errors
    /// Returns [`BridgeError`] only on a corrupt cached payload.
    pub async fn get_customer_by_chat_id(
        &self,
        chat_user_id: &str,
    ) -> Result<Option<Customer>, BridgeError> {
        let key = customer_chat_key(chat_user_id);
        let Some(got) = self.engine.get::<Customer>(&key).await? else {
            return Ok(None);
        };
        if got.layer == Layer::Postgres {
            if let Some(tid) = got.value.ticket_customer_id.clone() {
                let mirror = customer_ticket_key(&tid);
                if let Err(e) = self.engine.warm(&mirror, &got.value, None).await {
                    warn!(key = %mirror, error = %e, "failed to warm mirror customer cache key");
                }
            }
        }
        Ok(Some(got.value))
    }

    /// # Errors
    /// Returns [`BridgeError`] only on a corrupt cached payload.
    pub async fn get_customer_by_ticket_id(
        &self,
        ticket_customer_id: &str,
    ) -> Result<Option<Customer>, BridgeError> {
        let key = customer_ticket_key(ticket_customer_id);
        let Some(got) = self.engine.get::<Customer>(&key).await? else {
            return Ok(None);
        };
        if got.layer == Layer::Postgres {
            let mirror = customer_chat_key(&got.value.chat_user_id);
            if let Err(e) = self.engine.warm(&mirror, &got.value, None).await {
                warn!(key = %mirror, error = %e, "failed to warm mirror customer cache key");
            }
        }
        Ok(Some(got.value))
    }

    /// # Errors
    /// Propagates a durable-tier failure from the typed upsert (including
    /// [`BridgeError::DurableConstraint`] on a ticket_id collision, I1).
    pub async fn upsert_mapping(
        &self,
        upsert: &MappingUpsert,
    ) -> Result<ThreadTicketMapping, BridgeError> {
        let mapping = self.durable.upsert_mapping(upsert).await?;

        let thread_key = mapping_thread_key(&mapping.chat_thread_id);
        let ticket_key = mapping_ticket_key(&mapping.ticket_id);
        let (thread_res, ticket_res) = tokio::join!(
            self.engine.set(&thread_key, &mapping, None),
            self.engine.set(&ticket_key, &mapping, None),
        );
        if let Err(e) = thread_res {
            warn!(key = %thread_key, error = %e, "failed to mirror mapping cache key");
        }
        if let Err(e) = ticket_res {
            warn!(key = %ticket_key, error = %e, "failed to mirror mapping cache key");
        }

        Ok(mapping)
    }

    /// # Errors
    /// Returns [`BridgeError`] only on a corrupt cached payload.
    pub async fn get_mapping_by_thread(
        &self,
        chat_thread_id: &str,
    ) -> Result<Option<ThreadTicketMapping>, BridgeError> {
        let key = mapping_thread_key(chat_thread_id);
        let Some(got) = self.engine.get::<ThreadTicketMapping>(&key).await? else {
            return Ok(None);
        };
        if got.layer == Layer::Postgres {
            let mirror = mapping_ticket_key(&got.value.ticket_id);
            if let Err(e) = self.engine.warm(&mirror, &got.value, None).await {
                warn!(key = %mirror, error = %e, "failed to warm mirror mapping cache key");
            }
        }
        Ok(Some(got.value))
    }

    /// # Errors
    /// Returns [`BridgeError`] only on a corrupt cached payload.
    pub async fn get_mapping_by_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<Option<ThreadTicketMapping>, BridgeError> {
        let key = mapping_ticket_key(ticket_id);
        let Some(got) = self.engine.get::<ThreadTicketMapping>(&key).await? else {
            return Ok(None);
        };
        if got.layer == Layer::Postgres {
            let mirror = mapping_thread_key(&got.value.chat_thread_id);
            if let Err(e) = self.engine.warm(&mirror, &got.value, None).await {
                warn!(key = %mirror, error = %e, "failed to warm mirror mapping cache key");
            }
        }
        Ok(Some(got.value))
    }

    /// Clears a single namespaced cache entry. `pattern` pins the key's
    /// namespace so callers can never inject an arbitrary pattern into the
    /// key space (§4.5).
    ///
    /// # Errors
    /// Propagates a durable-tier failure from the underlying delete.
    pub async fn clear_cache(&self, pattern: CachePattern, id: &str) -> Result<(), BridgeError> {
        let key = match pattern {
            CachePattern::CustomerChat => customer_chat_key(id),
            CachePattern::CustomerTicket => customer_ticket_key(id),
            CachePattern::MappingThread => mapping_thread_key(id),
            CachePattern::MappingTicket => mapping_ticket_key(id),
            CachePattern::BotConfig => format!("bot:config:{id}"),
        };
        self.engine.delete(&key).await
    }
}
