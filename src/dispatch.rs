//! C9 — Event Dispatch (§4.9) and the capability traits Design Notes §9
//! calls for in place of an ambient global chat client.

use crate::domain::store::DomainStore;
use crate::error::BridgeError;
use crate::lookup::{self, RetryPolicy};
use crate::queue::event::{EventType, WebhookEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// A thread/channel handle as fetched from the chat platform.
#[derive(Debug, Clone)]
pub struct ChatThread {
    pub id: String,
    pub is_thread: bool,
}

/// Narrow capability handle for the chat side (Design Notes §9: "ambient
/// global chat client" → injected capability). The concrete gateway client
/// is out of scope (§1); only this interface is.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn fetch_thread(&self, thread_id: &str) -> anyhow::Result<ChatThread>;
    async fn send_message(&self, thread_id: &str, content: &str) -> anyhow::Result<()>;
    async fn add_member(&self, thread_id: &str, user_id: &str) -> anyhow::Result<()>;
}

/// Narrow capability handle for the ticket side. Exists so the
/// `conversation.created` handler has somewhere to call out to; the
/// concrete REST client is out of scope (§1).
#[async_trait]
pub trait TicketPlatform: Send + Sync {
    async fn create_ticket(&self, customer_id: &str, subject: &str) -> anyhow::Result<String>;
    async fn post_message(&self, ticket_id: &str, content: &str) -> anyhow::Result<()>;
}

/// Pure `event_type → handler` routing table (§4.9).
pub struct EventDispatcher {
    domain: Arc<DomainStore>,
    chat: Arc<dyn ChatPlatform>,
    ticket: Arc<dyn TicketPlatform>,
    retry_policy: RetryPolicy,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(
        domain: Arc<DomainStore>,
        chat: Arc<dyn ChatPlatform>,
        ticket: Arc<dyn TicketPlatform>,
    ) -> Self {
        Self {
            domain,
            chat,
            ticket,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Route a validated event to its handler.
    ///
    /// # Errors
    /// Returns [`BridgeError::HandlerFailed`] or [`BridgeError::MappingNotFound`]
    /// on handler failure; the queue consumer logs and drops on either (§4.9).
    pub async fn dispatch(&self, event: WebhookEvent) -> Result<(), BridgeError> {
        match event.event_type {
            EventType::MessageCreated => self.handle_message_created(&event).await,
            EventType::StatusUpdated => self.handle_status_updated(&event).await,
            EventType::ConversationCreated => self.handle_conversation_created(&event).await,
        }
    }

    async fn handle_message_created(&self, event: &WebhookEvent) -> Result<(), BridgeError> {
        let content = event.message_markdown.as_deref().unwrap_or_default();
        let thread = lookup::find_thread_by_ticket_with_retry(
            &self.domain,
            self.chat.as_ref(),
            &event.conversation_id,
            &self.retry_policy,
        )
        .await?;

        self.chat
            .send_message(&thread.id, content)
            .await
            .map_err(|source| BridgeError::HandlerFailed {
                conversation_id: event.conversation_id.clone(),
                source,
            })
    }

    async fn handle_status_updated(&self, event: &WebhookEvent) -> Result<(), BridgeError> {
        let Some(mapping) = self
            .domain
            .get_mapping_by_ticket(&event.conversation_id)
            .await?
        else {
            warn!(
                conversation_id = %event.conversation_id,
                "status update for unknown ticket, dropping"
            );
            return Ok(());
        };
        warn!(
            chat_thread_id = %mapping.chat_thread_id,
            status = %mapping.status,
            "status update received; no chat-side action defined for this handler"
        );
        Ok(())
    }

    async fn handle_conversation_created(&self, event: &WebhookEvent) -> Result<(), BridgeError> {
        // Chat-side thread creation is out of scope (§1); this handler only
        // confirms the ticket platform already has a record for it.
        if let Err(e) = self
            .ticket
            .post_message(&event.conversation_id, "conversation created")
            .await
        {
            warn!(
                conversation_id = %event.conversation_id,
                error = %e,
                "failed to acknowledge conversation.created on ticket platform"
            );
        }
        Ok(())
    }
}
