//! Queue consumer integration tests (S5, S6, S7).

mod common;

use async_trait::async_trait;
use common::{connected_bridge, live_backends_available, unique_id};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use unthread_storage_bridge::{ChatPlatform, ChatThread, TicketPlatform};

struct NoopChatPlatform;

#[async_trait]
impl ChatPlatform for NoopChatPlatform {
    async fn fetch_thread(&self, thread_id: &str) -> anyhow::Result<ChatThread> {
        Ok(ChatThread {
            id: thread_id.to_string(),
            is_thread: true,
        })
    }
    async fn send_message(&self, _thread_id: &str, _content: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn add_member(&self, _thread_id: &str, _user_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

struct NoopTicketPlatform;

#[async_trait]
impl TicketPlatform for NoopTicketPlatform {
    async fn create_ticket(&self, _customer_id: &str, _subject: &str) -> anyhow::Result<String> {
        Ok("ticket".to_string())
    }
    async fn post_message(&self, _ticket_id: &str, _content: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn push_raw(queue: &str, payload: &str) {
    let url = std::env::var("WEBHOOK_REDIS_URL").expect("WEBHOOK_REDIS_URL must be set");
    let client = redis::Client::open(url).expect("valid redis url");
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .expect("connect");
    let _: () = conn.lpush(queue, payload).await.expect("lpush");
}

#[tokio::test]
async fn malformed_event_is_dropped_and_polling_continues() {
    if !live_backends_available() {
        return;
    }

    let bridge = connected_bridge().await;
    let queue = unique_id("queue-malformed");

    let consumer = bridge
        .build_consumer(queue.clone(), Arc::new(NoopChatPlatform), Arc::new(NoopTicketPlatform))
        .await
        .expect("consumer should build");

    push_raw(&queue, "not-json").await;
    consumer.start().expect("start should succeed");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let len = consumer.queue_len().await.unwrap_or(-1);
    consumer.stop().await;

    assert_eq!(len, 0, "malformed event must still be popped off the queue");
}

#[tokio::test]
async fn graceful_stop_drains_in_flight_handlers() {
    if !live_backends_available() {
        return;
    }

    let bridge = connected_bridge().await;
    let queue = unique_id("queue-drain");
    let ticket_id = unique_id("T");

    let consumer = bridge
        .build_consumer(queue.clone(), Arc::new(NoopChatPlatform), Arc::new(NoopTicketPlatform))
        .await
        .expect("consumer should build");

    let payload = format!(
        r#"{{"type":"conversation.message.created","data":{{"conversationId":"{ticket_id}","message":{{"markdown":"hi"}}}}}}"#
    );
    for _ in 0..5 {
        push_raw(&queue, &payload).await;
    }

    consumer.start().expect("start should succeed");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stopped = tokio::time::timeout(Duration::from_secs(30), consumer.stop()).await;
    assert!(stopped.is_ok(), "stop() must return within 30s");
    assert_eq!(
        consumer.state(),
        unthread_storage_bridge::ConsumerState::Stopped
    );
}
