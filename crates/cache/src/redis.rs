use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::timeout;
use tracing::debug;

use crate::error::CacheError;
use crate::store::{CacheStatsSnapshot, CacheStore};

/// Out-of-process cache backed by Redis.
///
/// Every operation runs under a short deadline (default 50 ms); a slow or
/// unreachable Redis yields `CacheError`, never a hang on the request path.
/// Entry TTLs are enforced server-side via `SET ... PX`.
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
    op_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RedisCache {
    /// Connect to Redis at `url`, namespacing all keys under `prefix`.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        op_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let prefix = prefix.into();
        let client = redis::Client::open(url).map_err(|e| CacheError::Backend(e.to_string()))?;
        let conn = timeout(op_timeout.max(Duration::from_secs(2)), ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(timeout_ms(op_timeout)))?
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        debug!(prefix = %prefix, "redis cache connected");
        Ok(Self {
            conn,
            prefix,
            op_timeout,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

fn timeout_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let full = self.full_key(key);
        let value: Option<String> = timeout(self.op_timeout, conn.get(&full))
            .await
            .map_err(|_| CacheError::Timeout(timeout_ms(self.op_timeout)))?
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let full = self.full_key(key);
        let px = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        timeout(
            self.op_timeout,
            redis::cmd("SET")
                .arg(&full)
                .arg(value)
                .arg("PX")
                .arg(px)
                .query_async::<()>(&mut conn),
        )
        .await
        .map_err(|_| CacheError::Timeout(timeout_ms(self.op_timeout)))?
        .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let full = self.full_key(key);
        let removed: i64 = timeout(self.op_timeout, conn.del(&full))
            .await
            .map_err(|_| CacheError::Timeout(timeout_ms(self.op_timeout)))?
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(removed > 0)
    }

    fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}
