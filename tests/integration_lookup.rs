//! Thread-lookup retry integration tests (P6, S3, S4).

mod common;

use async_trait::async_trait;
use common::{connected_bridge, live_backends_available, unique_id};
use std::sync::Arc;
use std::time::Duration;
use unthread_storage_bridge::{
    BridgeError, ChatPlatform, ChatThread, MappingStatus, MappingUpsert, RetryPolicy,
};

struct FakeChatPlatform;

#[async_trait]
impl ChatPlatform for FakeChatPlatform {
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

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        window: Duration::from_secs(10),
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(250),
    }
}

#[tokio::test]
async fn retry_absorbs_mapping_written_mid_window() {
    if !live_backends_available() {
        return;
    }

    let bridge = connected_bridge().await;
    let chat = FakeChatPlatform;
    let ticket_id = unique_id("T");
    let chat_thread_id = unique_id("Th");
    let policy = fast_policy();

    let domain = Arc::clone(&bridge.domain);
    let ticket_id_writer = ticket_id.clone();
    let chat_thread_id_writer = chat_thread_id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        domain
            .upsert_mapping(&MappingUpsert {
                chat_thread_id: chat_thread_id_writer,
                ticket_id: ticket_id_writer,
                chat_channel_id: None,
                customer_id: None,
                status: MappingStatus::Active,
            })
            .await
            .expect("writer upsert should succeed");
    });

    let thread = unthread_storage_bridge::lookup::find_thread_by_ticket_with_retry(
        &bridge.domain,
        &chat,
        &ticket_id,
        &policy,
    )
    .await
    .expect("lookup should eventually succeed");

    assert_eq!(thread.id, chat_thread_id);
}

#[tokio::test]
async fn retry_exhausts_and_classifies_as_race_when_never_written() {
    if !live_backends_available() {
        return;
    }

    let bridge = connected_bridge().await;
    let chat = FakeChatPlatform;
    let ticket_id = unique_id("T-never");
    let policy = fast_policy();

    let err = unthread_storage_bridge::lookup::find_thread_by_ticket_with_retry(
        &bridge.domain,
        &chat,
        &ticket_id,
        &policy,
    )
    .await
    .expect_err("lookup should exhaust retries");

    match err {
        BridgeError::MappingNotFound(ctx) => {
            assert_eq!(ctx.attempts, 3);
            assert!(ctx.likely_race_condition());
        }
        other => panic!("expected MappingNotFound, got {other:?}"),
    }
}
