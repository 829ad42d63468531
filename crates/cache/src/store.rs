use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheError;

/// Default TTLs for the record classes the gateway caches.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    /// Resolved contract documents.
    pub contract: Duration,
    /// Hot validation results.
    pub result: Duration,
    /// Guardrail configurations.
    pub guardrail: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            contract: Duration::from_secs(300),
            result: Duration::from_secs(60),
            guardrail: Duration::from_secs(600),
        }
    }
}

/// Point-in-time hit/miss counters for a cache backend.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStatsSnapshot {
    /// Reads served from the cache.
    pub hits: u64,
    /// Reads that fell through to the caller.
    pub misses: u64,
}

impl CacheStatsSnapshot {
    /// Hit ratio in `[0, 1]`; zero when no reads happened.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.hits as f64 / total as f64
        }
    }
}

/// Short-TTL key/value store for contracts, guardrail configs, and hot
/// validation results.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Entries expire strictly: a get at or after `ttl` returns `None`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the value for a key. Returns `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value with an explicit TTL, overwriting any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Current hit/miss counters.
    fn stats(&self) -> CacheStatsSnapshot;
}

/// Get and JSON-decode a typed record.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// JSON-encode and set a typed record with the given TTL.
pub async fn set_json<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_match_record_classes() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.contract, Duration::from_secs(300));
        assert_eq!(ttls.result, Duration::from_secs(60));
        assert_eq!(ttls.guardrail, Duration::from_secs(600));
    }

    #[test]
    fn hit_ratio() {
        let empty = CacheStatsSnapshot::default();
        assert!((empty.hit_ratio() - 0.0).abs() < f64::EPSILON);

        let snap = CacheStatsSnapshot {
            hits: 3,
            misses: 1,
        };
        assert!((snap.hit_ratio() - 0.75).abs() < 1e-9);
    }
}
