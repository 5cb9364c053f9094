//! Bot configuration — direct C4 pass-through under `bot:config:<k>` (§4.5).

use crate::engine::UnifiedStorageEngine;
use crate::error::BridgeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

fn key(k: &str) -> String {
    format!("bot:config:{k}")
}

/// # Errors
/// Propagates a durable-tier failure only; cache-tier failures never reach
/// the caller (§4.5).
pub async fn set_bot_config<T: Serialize>(
    engine: &UnifiedStorageEngine,
    k: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), BridgeError> {
    engine.set(&key(k), value, ttl).await
}

/// # Errors
/// Returns [`BridgeError`] only on a corrupt stored payload.
pub async fn get_bot_config<T: DeserializeOwned>(
    engine: &UnifiedStorageEngine,
    k: &str,
) -> Result<Option<T>, BridgeError> {
    Ok(engine.get(&key(k)).await?.map(|got| got.value))
}

/// # Errors
/// Propagates a durable-tier failure only.
pub async fn delete_bot_config(engine: &UnifiedStorageEngine, k: &str) -> Result<(), BridgeError> {
    engine.delete(&key(k)).await
}
