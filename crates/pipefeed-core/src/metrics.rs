//! Atomic counters for feed observability.
//!
//! Each [`FeedEngine`](crate::engine::FeedEngine) owns one [`FeedMetrics`].
//! Counters are bumped silently at the call site; [`FeedMetrics::flush`]
//! emits the current values as a single `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct FeedMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    enrich_failures: AtomicU64,
    hints_recorded: AtomicU64,
    synthetic_rows: AtomicU64,
    pages_served: AtomicU64,
}

/// Point-in-time copy of [`FeedMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub enrich_failures: u64,
    pub hints_recorded: u64,
    pub synthetic_rows: u64,
    pub pages_served: u64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_misses", "counter incremented");
    }

    pub fn inc_enrich_failure(&self) {
        self.enrich_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "enrich_failures", "counter incremented");
    }

    pub fn inc_hints_recorded(&self) {
        self.hints_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_synthetic_rows(&self, n: u64) {
        self.synthetic_rows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_pages_served(&self) {
        self.pages_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            enrich_failures: self.enrich_failures.load(Ordering::Relaxed),
            hints_recorded: self.hints_recorded.load(Ordering::Relaxed),
            synthetic_rows: self.synthetic_rows.load(Ordering::Relaxed),
            pages_served: self.pages_served.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as one `info!` event.
    ///
    /// Call at natural boundaries (end of a command, periodic tick) rather
    /// than on every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            cache_hits = s.cache_hits,
            cache_misses = s.cache_misses,
            enrich_failures = s.enrich_failures,
            hints_recorded = s.hints_recorded,
            synthetic_rows = s.synthetic_rows,
            pages_served = s.pages_served,
        );
    }
}
