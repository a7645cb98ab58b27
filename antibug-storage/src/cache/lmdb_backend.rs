//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped key-value store for antibiogram payloads that survives
//! process restarts.
//!
//! # Value layout
//!
//! `[expires_at_millis: 8 bytes LE][payload]`. Entries whose expiry has passed
//! read as misses and are deleted on that read. All expired entries are
//! purged every [`SWEEP_EVERY_SETS`](super::traits::SWEEP_EVERY_SETS) writes
//! and whenever a write finds the map full.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, `delete` and expired-entry removal
//! - Statistics are tracked behind a `RwLock`

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use antibug_core::{AntibugError, AntibugResult, CacheError};
use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use tracing::{debug, warn};

use super::memory::expiry_from;
use super::traits::{sweep_due, CacheBackend, CacheStats};

const EXPIRY_PREFIX_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value is shorter than its expiry prefix.
    #[error("Corrupt entry: {0}")]
    CorruptEntry(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for AntibugError {
    fn from(e: LmdbCacheError) -> Self {
        AntibugError::Cache(CacheError::CommandFailed {
            command: "lmdb".to_string(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Location and size of the LMDB cache environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LmdbCacheConfig {
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl Default for LmdbCacheConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join("antibug-cache"),
            max_size_mb: 256,
        }
    }
}

impl LmdbCacheConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ANTIBUG_CACHE_PATH`: LMDB directory (default: `$TMPDIR/antibug-cache`)
    /// - `ANTIBUG_CACHE_MAX_SIZE_MB`: map size in megabytes (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: std::env::var("ANTIBUG_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("ANTIBUG_CACHE_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
        }
    }

    /// Open the backend described by this configuration.
    pub fn open(&self) -> Result<LmdbCacheBackend, LmdbCacheError> {
        LmdbCacheBackend::new(&self.path, self.max_size_mb)
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// LMDB-backed cache.
///
/// # Example
///
/// ```ignore
/// use antibug_storage::cache::{CacheBackend, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/tmp/antibug-cache", 100)?;
/// backend.set(key.as_bytes(), &payload, ttl).await?;
/// let cached = backend.get(key.as_bytes()).await?;
/// ```
pub struct LmdbCacheBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Global statistics.
    stats: Arc<RwLock<CacheStats>>,
    /// Writes since open, for sweep scheduling.
    writes: AtomicU64,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let entry_count = {
            let rtxn = env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            db.len(&rtxn)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
        };
        debug!(path = %path.as_ref().display(), entry_count, max_size_mb, "opened LMDB cache");

        Ok(Self {
            env,
            db,
            stats: Arc::new(RwLock::new(CacheStats {
                entry_count,
                ..Default::default()
            })),
            writes: AtomicU64::new(0),
        })
    }

    /// Delete every entry whose expiry has passed. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<u64, LmdbCacheError> {
        let now_millis = Utc::now().timestamp_millis();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let mut expired: Vec<(Vec<u8>, usize)> = Vec::new();
        for item in self
            .db
            .iter(&wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
        {
            let (key, bytes) = item.map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            if split_entry(bytes).is_ok_and(|(expires_at, _)| expires_at <= now_millis) {
                expired.push((key.to_vec(), bytes.len()));
            }
        }

        let mut purged = 0u64;
        let mut freed = 0u64;
        for (key, len) in &expired {
            let deleted = self
                .db
                .delete(&mut wtxn, key)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            if deleted {
                purged += 1;
                freed += *len as u64;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        if purged > 0 {
            self.record(|s| {
                s.expirations += purged;
                s.entry_count = s.entry_count.saturating_sub(purged);
                s.memory_bytes = s.memory_bytes.saturating_sub(freed);
            });
            debug!(purged, freed_bytes = freed, "purged expired cache entries");
        }
        Ok(purged)
    }

    /// Put `bytes` under `key`, returning the length of the value it replaced.
    fn write_entry(&self, key: &[u8], bytes: &[u8]) -> heed::Result<Option<usize>> {
        let mut wtxn = self.env.write_txn()?;
        let previous_len = self.db.get(&wtxn, key)?.map(|value| value.len());
        self.db.put(&mut wtxn, key, bytes)?;
        wtxn.commit()?;
        Ok(previous_len)
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Delete `key` if its stored expiry is still the one observed on read.
    fn remove_expired(&self, key: &[u8], observed_expiry: i64) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let still_expired = self
            .db
            .get(&wtxn, key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            .and_then(|bytes| split_entry(bytes).ok())
            .is_some_and(|(expiry, _)| expiry == observed_expiry);

        let deleted = if still_expired {
            self.db
                .delete(&mut wtxn, key)
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
        } else {
            false
        };

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(deleted)
    }
}

fn split_entry(bytes: &[u8]) -> Result<(i64, &[u8]), LmdbCacheError> {
    if bytes.len() < EXPIRY_PREFIX_LEN {
        return Err(LmdbCacheError::CorruptEntry(format!(
            "{} bytes, expected at least {}",
            bytes.len(),
            EXPIRY_PREFIX_LEN
        )));
    }
    let (prefix, payload) = bytes.split_at(EXPIRY_PREFIX_LEN);
    let expiry_bytes: [u8; EXPIRY_PREFIX_LEN] = prefix
        .try_into()
        .map_err(|_| LmdbCacheError::CorruptEntry("invalid expiry".into()))?;
    Ok((i64::from_le_bytes(expiry_bytes), payload))
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &[u8]) -> AntibugResult<Option<Vec<u8>>> {
        let now_millis = Utc::now().timestamp_millis();

        let found = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

            match self.db.get(&rtxn, key) {
                Ok(Some(bytes)) => {
                    let (expires_at, payload) = split_entry(bytes)?;
                    Some((expires_at, payload.to_vec()))
                }
                Ok(None) => None,
                Err(e) => {
                    self.record(|s| s.misses += 1);
                    return Err(LmdbCacheError::Transaction(e.to_string()).into());
                }
            }
        };

        match found {
            Some((expires_at, payload)) if expires_at > now_millis => {
                self.record(|s| s.hits += 1);
                Ok(Some(payload))
            }
            Some((expires_at, payload)) => {
                if self.remove_expired(key, expires_at)? {
                    debug!(key = %hex::encode(key), expires_at, "removed expired cache entry");
                    self.record(|s| {
                        s.expirations += 1;
                        s.entry_count = s.entry_count.saturating_sub(1);
                        s.memory_bytes = s.memory_bytes.saturating_sub(
                            (EXPIRY_PREFIX_LEN + payload.len()) as u64,
                        );
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
        let expires_at = expiry_from(Utc::now(), ttl).timestamp_millis();

        let mut full_bytes = Vec::with_capacity(EXPIRY_PREFIX_LEN + value.len());
        full_bytes.extend_from_slice(&expires_at.to_le_bytes());
        full_bytes.extend_from_slice(value);

        if sweep_due(&self.writes) {
            self.purge_expired()?;
        }

        let previous_len = match self.write_entry(key, &full_bytes) {
            Err(heed::Error::Mdb(MdbError::MapFull)) => {
                let purged = self.purge_expired()?;
                warn!(purged, "LMDB cache map full, retrying write after purge");
                self.write_entry(key, &full_bytes)
            }
            other => other,
        }
        .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        self.record(|s| {
            match previous_len {
                Some(len) => s.memory_bytes = s.memory_bytes.saturating_sub(len as u64),
                None => s.entry_count += 1,
            }
            s.memory_bytes += full_bytes.len() as u64;
        });

        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> AntibugResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let previous_len = self
            .db
            .get(&wtxn, key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
            .map(|bytes| bytes.len());

        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        if deleted {
            self.record(|s| {
                s.entry_count = s.entry_count.saturating_sub(1);
                s.memory_bytes = s
                    .memory_bytes
                    .saturating_sub(previous_len.unwrap_or(0) as u64);
            });
        }

        Ok(deleted)
    }

    async fn stats(&self) -> AntibugResult<CacheStats> {
        Ok(self.stats.read().map(|s| s.clone()).unwrap_or_default())
    }
}
