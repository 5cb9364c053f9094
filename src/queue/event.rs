//! Webhook event wire format and validation (§6/§11).

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    MessageCreated,
    StatusUpdated,
    ConversationCreated,
}

impl EventType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "conversation.message.created" | "message_created" => Some(Self::MessageCreated),
            "conversation.status.updated" => Some(Self::StatusUpdated),
            "conversation.created" => Some(Self::ConversationCreated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: EventType,
    pub conversation_id: String,
    pub message_markdown: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Validate a raw decoded payload against the wire contract of §6.
///
/// Returns `None` (never an `Err`) for an unrecognized `type` or a missing
/// required field — both are dropped with a warn log by the caller, per
/// §4.9/§7.
#[must_use]
pub fn validate(raw: &Value) -> Option<WebhookEvent> {
    let event_type = raw.get("type")?.as_str().and_then(EventType::parse)?;
    let data = raw.get("data")?;

    let conversation_id = data
        .get("conversationId")
        .and_then(Value::as_str)
        .or_else(|| {
            data.get("conversation")
                .and_then(|c| c.get("id"))
                .and_then(Value::as_str)
        })
        .or_else(|| data.get("id").and_then(Value::as_str))?
        .to_string();

    let message_markdown = data
        .get("message")
        .and_then(|m| m.get("markdown"))
        .and_then(Value::as_str)
        .or_else(|| data.get("text").and_then(Value::as_str))
        .map(str::to_string);

    // A message-created event with no message content is malformed; other
    // event types carry no message content by design.
    if event_type == EventType::MessageCreated && message_markdown.is_none() {
        return None;
    }

    Some(WebhookEvent {
        event_type,
        conversation_id,
        message_markdown,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_canonical_message_created() {
        let raw = json!({
            "type": "conversation.message.created",
            "data": {"conversationId": "T1", "message": {"markdown": "hi"}}
        });
        let event = validate(&raw).expect("valid event");
        assert_eq!(event.event_type, EventType::MessageCreated);
        assert_eq!(event.conversation_id, "T1");
        assert_eq!(event.message_markdown.as_deref(), Some("hi"));
    }

    #[test]
    fn accepts_message_created_alias_type() {
        let raw = json!({
            "type": "message_created",
            "data": {"id": "T2", "text": "hello"}
        });
        let event = validate(&raw).expect("valid event");
        assert_eq!(event.conversation_id, "T2");
        assert_eq!(event.message_markdown.as_deref(), Some("hello"));
    }

    #[test]
    fn accepts_conversation_id_nested_under_conversation_object() {
        let raw = json!({
            "type": "conversation.status.updated",
            "data": {"conversation": {"id": "T3"}}
        });
        let event = validate(&raw).expect("valid event");
        assert_eq!(event.conversation_id, "T3");
    }

    #[test]
    fn rejects_unknown_type() {
        let raw = json!({"type": "something.else", "data": {"id": "T4"}});
        assert!(validate(&raw).is_none());
    }

    #[test]
    fn rejects_missing_conversation_id() {
        let raw = json!({"type": "conversation.created", "data": {}});
        assert!(validate(&raw).is_none());
    }

    #[test]
    fn rejects_message_created_without_content() {
        let raw = json!({
            "type": "conversation.message.created",
            "data": {"conversationId": "T5"}
        });
        assert!(validate(&raw).is_none());
    }
}
