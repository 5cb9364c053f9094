//! Engine-wide counters (§4.4)
//!
//! Counting itself is gated by `DEBUG_MODE` (`UnifiedStorageEngine::debug_mode`);
//! when disabled every `record_*` call on the engine is skipped and these
//! counters stay at zero.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct EngineMetrics {
    pub l1_hits: AtomicU64,
    pub l2_hits: AtomicU64,
    pub l3_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub writes: AtomicU64,
    pub deletes: AtomicU64,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct EngineMetricsSnapshot {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub l3_hits: u64,
    pub cache_misses: u64,
    pub writes: u64,
    pub deletes: u64,
    pub l1_memory_size: u64,
    pub cache_hit_ratio: f64,
}

impl EngineMetrics {
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_l3_hit(&self) {
        self.l3_hits.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self, l1_memory_size: u64) -> EngineMetricsSnapshot {
        let l1 = self.l1_hits.load(Ordering::Relaxed);
        let l2 = self.l2_hits.load(Ordering::Relaxed);
        let l3 = self.l3_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let hits = l1 + l2 + l3;
        let total = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let cache_hit_ratio = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        EngineMetricsSnapshot {
            l1_hits: l1,
            l2_hits: l2,
            l3_hits: l3,
            cache_misses: misses,
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            l1_memory_size,
            cache_hit_ratio,
        }
    }
}
