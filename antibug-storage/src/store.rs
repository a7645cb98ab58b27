//! Culture record store trait and in-memory implementation

use crate::query::CultureQuery;
use antibug_core::{AntibugResult, CultureRecord, StorageError};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Read-only access to culture records.
///
/// Implementations must be shareable across tasks; the engine holds them
/// behind an `Arc` and calls `find` concurrently.
#[async_trait]
pub trait CultureStore: Send + Sync {
    /// Return every record satisfying the query.
    async fn find(&self, query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>>;
}

#[async_trait]
impl<T: CultureStore + ?Sized> CultureStore for Arc<T> {
    async fn find(&self, query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>> {
        (**self).find(query).await
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory culture store. Evaluates queries with [`CultureQuery::matches`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryCultureStore {
    records: Arc<RwLock<Vec<CultureRecord>>>,
}

impl InMemoryCultureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with records.
    pub fn with_records(records: impl IntoIterator<Item = CultureRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records.into_iter().collect())),
        }
    }

    pub fn insert(&self, record: CultureRecord) -> AntibugResult<()> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> AntibugResult<()> {
        self.records
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

#[async_trait]
impl CultureStore for InMemoryCultureStore {
    async fn find(&self, query: &CultureQuery) -> AntibugResult<Vec<CultureRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }
}
