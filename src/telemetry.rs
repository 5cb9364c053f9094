//! Logging bootstrap
//!
//! Installs an env-filtered `tracing` subscriber. The teacher crate's tiers
//! logged via `println!`; this crate logs through `tracing` everywhere so
//! log level and structure are consistent from L1 up through the consumer.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the global `tracing` subscriber.
///
/// Respects `RUST_LOG`, defaulting to `info` when unset. Safe to call once
/// at process startup; a second call is a no-op (the underlying
/// `set_global_default` error is discarded, matching how short-lived test
/// binaries call this repeatedly).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
