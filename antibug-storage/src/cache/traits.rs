//! Cache backend trait and statistics.

use antibug_core::AntibugResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Key/value cache with per-entry expiry.
///
/// Keys are opaque byte strings (antibiogram fingerprints). Values are
/// serialized payloads; the backend never interprets them.
///
/// # Contract
///
/// - `get` returns `Ok(None)` for a missing or expired key. Any `Err` is a
///   backend failure, never a miss.
/// - `set` overwrites an existing entry and resets its expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the payload stored under `key`.
    async fn get(&self, key: &[u8]) -> AntibugResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> AntibugResult<()>;

    /// Remove the entry under `key`. Returns whether an entry was removed.
    async fn delete(&self, key: &[u8]) -> AntibugResult<bool>;

    /// Get cache statistics.
    async fn stats(&self) -> AntibugResult<CacheStats>;
}

#[async_trait]
impl<T: CacheBackend + ?Sized> CacheBackend for Arc<T> {
    async fn get(&self, key: &[u8]) -> AntibugResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> AntibugResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &[u8]) -> AntibugResult<bool> {
        (**self).delete(key).await
    }

    async fn stats(&self) -> AntibugResult<CacheStats> {
        (**self).stats().await
    }
}

/// Writes between sweeps of expired entries.
pub const SWEEP_EVERY_SETS: u64 = 64;

/// Count one write. True when a sweep of expired entries is due.
pub(crate) fn sweep_due(writes: &AtomicU64) -> bool {
    writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY_SETS == SWEEP_EVERY_SETS - 1
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate payload size in bytes.
    pub memory_bytes: u64,
    /// Number of expired entries dropped, on read or by a sweep.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
