use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters for embedding cache behaviour and provider health.
///
/// All counters use relaxed ordering; call [`snapshot`](Self::snapshot) for a
/// point-in-time view.
#[derive(Debug, Default)]
pub struct EmbeddingMetrics {
    /// Anchor embeddings (centroids, topic anchors) served from cache.
    pub anchor_hits: AtomicU64,
    /// Anchor embeddings requiring a provider call.
    pub anchor_misses: AtomicU64,
    /// Payload embeddings served from cache.
    pub payload_hits: AtomicU64,
    /// Payload embeddings requiring a provider call.
    pub payload_misses: AtomicU64,
    /// Provider errors.
    pub errors: AtomicU64,
    /// Times a semantic check degraded to its lexical fallback.
    pub lexical_fallbacks: AtomicU64,
}

/// Point-in-time view of [`EmbeddingMetrics`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EmbeddingMetricsSnapshot {
    pub anchor_hits: u64,
    pub anchor_misses: u64,
    pub payload_hits: u64,
    pub payload_misses: u64,
    pub errors: u64,
    pub lexical_fallbacks: u64,
}

impl EmbeddingMetrics {
    /// Record an anchor-tier cache hit.
    pub fn record_anchor_hit(&self) {
        self.anchor_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an anchor-tier cache miss.
    pub fn record_anchor_miss(&self) {
        self.anchor_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload-tier cache hit.
    pub fn record_payload_hit(&self) {
        self.payload_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a payload-tier cache miss.
    pub fn record_payload_miss(&self) {
        self.payload_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a provider error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a degradation to the lexical fallback path.
    pub fn record_lexical_fallback(&self) {
        self.lexical_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent point-in-time view of all counters.
    pub fn snapshot(&self) -> EmbeddingMetricsSnapshot {
        EmbeddingMetricsSnapshot {
            anchor_hits: self.anchor_hits.load(Ordering::Relaxed),
            anchor_misses: self.anchor_misses.load(Ordering::Relaxed),
            payload_hits: self.payload_hits.load(Ordering::Relaxed),
            payload_misses: self.payload_misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            lexical_fallbacks: self.lexical_fallbacks.load(Ordering::Relaxed),
        }
    }
}
