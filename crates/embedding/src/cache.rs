use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::error::EmbeddingError;
use crate::metrics::EmbeddingMetrics;
use crate::provider::EmbeddingProvider;

/// Which cache tier this instance represents (used to increment the correct
/// metric counters).
#[derive(Debug, Clone, Copy)]
pub enum CacheTier {
    /// Anchor embeddings: guardrail example centroids and hybrid topic
    /// anchors (long TTL, survives across requests).
    Anchor,
    /// Payload embeddings: per-request text (short TTL, deduplicates retries
    /// and identical prompts).
    Payload,
}

/// A bounded, TTL-based embedding cache backed by [`moka`].
///
/// Uses `try_get_with` to coalesce concurrent requests for the same key so a
/// burst of identical payloads produces a single provider call.
pub struct EmbeddingCache {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Cache<String, Vec<f32>>,
    metrics: Arc<EmbeddingMetrics>,
    tier: CacheTier,
}

impl EmbeddingCache {
    /// Create a new cache backed by the given embedding provider.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        max_capacity: u64,
        ttl: Duration,
        metrics: Arc<EmbeddingMetrics>,
        tier: CacheTier,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self {
            provider,
            cache,
            metrics,
            tier,
        }
    }

    /// Get the embedding for a text, computing it via the provider on miss.
    ///
    /// Hit/miss counters are approximate under high concurrency: concurrent
    /// requests for the same uncached key may all count as misses even though
    /// only one provider call is made.
    pub async fn get(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(val) = self.cache.get(text).await {
            self.record_hit();
            return Ok(val);
        }

        self.record_miss();
        let provider = Arc::clone(&self.provider);
        let key = text.to_owned();
        self.cache
            .try_get_with(key, async move { provider.embed(text).await })
            .await
            .map_err(|e| {
                self.metrics.record_error();
                EmbeddingError::ApiError(e.to_string())
            })
    }

    fn record_hit(&self) {
        match self.tier {
            CacheTier::Anchor => self.metrics.record_anchor_hit(),
            CacheTier::Payload => self.metrics.record_payload_hit(),
        }
    }

    fn record_miss(&self) {
        match self.tier {
            CacheTier::Anchor => self.metrics.record_anchor_miss(),
            CacheTier::Payload => self.metrics.record_payload_miss(),
        }
    }
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("tier", &self.tier)
            .finish_non_exhaustive()
    }
}
