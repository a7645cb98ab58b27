//! In-memory cache backend.
//!
//! Entries carry an absolute expiry. Expired entries are dropped when read
//! and by a sweep every [`SWEEP_EVERY_SETS`](super::traits::SWEEP_EVERY_SETS)
//! writes.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use antibug_core::{AntibugResult, CacheError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::traits::{sweep_due, CacheBackend, CacheStats};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Process-local cache keyed by raw bytes.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCacheBackend {
    entries: Arc<RwLock<HashMap<Vec<u8>, Entry>>>,
    stats: Arc<RwLock<CacheStats>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until read or swept.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> AntibugResult<u64> {
        let now = Utc::now();
        let mut purged = 0u64;
        let mut freed = 0u64;
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .retain(|_, entry| {
                let live = entry.expires_at > now;
                if !live {
                    purged += 1;
                    freed += entry.value.len() as u64;
                }
                live
            });

        if purged > 0 {
            self.record(|s| {
                s.expirations += purged;
                s.entry_count = s.entry_count.saturating_sub(purged);
                s.memory_bytes = s.memory_bytes.saturating_sub(freed);
            });
        }
        Ok(purged)
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

pub(crate) fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &[u8]) -> AntibugResult<Option<Vec<u8>>> {
        let now = Utc::now();
        let found = {
            let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
            entries.get(key).cloned()
        };

        match found {
            Some(entry) if entry.expires_at > now => {
                self.record(|s| s.hits += 1);
                Ok(Some(entry.value))
            }
            Some(entry) => {
                let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
                // Only drop it if no writer refreshed it meanwhile.
                if entries
                    .get(key)
                    .is_some_and(|current| current.expires_at <= now)
                {
                    entries.remove(key);
                    self.record(|s| {
                        s.expirations += 1;
                        s.entry_count = s.entry_count.saturating_sub(1);
                        s.memory_bytes = s.memory_bytes.saturating_sub(entry.value.len() as u64);
                    });
                }
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            None => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &[u8], value: &[u8], ttl: Duration) -> AntibugResult<()> {
        if sweep_due(&self.writes) {
            self.purge_expired()?;
        }

        let entry = Entry {
            value: value.to_vec(),
            expires_at: expiry_from(Utc::now(), ttl),
        };
        let previous = self
            .entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .insert(key.to_vec(), entry);

        self.record(|s| {
            match previous {
                Some(old) => {
                    s.memory_bytes = s.memory_bytes.saturating_sub(old.value.len() as u64);
                }
                None => s.entry_count += 1,
            }
            s.memory_bytes += value.len() as u64;
        });
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> AntibugResult<bool> {
        let removed = self
            .entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .remove(key);

        if let Some(old) = &removed {
            self.record(|s| {
                s.entry_count = s.entry_count.saturating_sub(1);
                s.memory_bytes = s.memory_bytes.saturating_sub(old.value.len() as u64);
            });
        }
        Ok(removed.is_some())
    }

    async fn stats(&self) -> AntibugResult<CacheStats> {
        Ok(self.stats.read().map(|s| s.clone()).unwrap_or_default())
    }
}
