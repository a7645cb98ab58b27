//! Cache-aside antibiogram controller
//!
//! Serves one subject of a filter: read the cache, and on a miss query the
//! culture store, aggregate, write the result back with the configured TTL.

use std::sync::Arc;

use antibug_core::{
    AntibugResult, EngineConfig, Filter, SubjectAntibiogram, SubjectKind, SubjectRef,
};
use antibug_storage::{
    fingerprint_for_subject, CacheBackend, CultureQuery, CultureStore, Fingerprint,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::aggregate::aggregate;
use crate::codec;
use crate::context::RequestContext;

/// Source of the current time for time-window predicates.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ============================================================================
// PER-KEY LOCKS
// ============================================================================

/// Async mutexes keyed by fingerprint, created on demand.
#[derive(Default)]
struct KeyLocks {
    locks: DashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>,
}

impl KeyLocks {
    /// Wait for the lock on `key`.
    ///
    /// The table entry is dropped with the last guard or waiter, including
    /// when the waiting future itself is dropped.
    async fn acquire(&self, key: Fingerprint) -> KeyGuard<'_> {
        let lease = KeyLease { locks: self, key };
        let lock = self.locks.entry(key).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct KeyLease<'a> {
    locks: &'a KeyLocks,
    key: Fingerprint,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        self.locks
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Held lock on one key. Field order releases the mutex before the lease.
struct KeyGuard<'a> {
    _guard: OwnedMutexGuard<()>,
    _lease: KeyLease<'a>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Cache-aside antibiogram engine over a culture store and a cache backend.
pub struct AntibiogramEngine<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    cache: Arc<C>,
    config: EngineConfig,
    clock: Clock,
    locks: Option<KeyLocks>,
}

impl<S, C> AntibiogramEngine<S, C>
where
    S: CultureStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    /// Create an engine. Fails if `config` does not validate.
    pub fn new(store: Arc<S>, cache: Arc<C>, config: EngineConfig) -> AntibugResult<Self> {
        config.validate()?;
        let locks = config.single_flight.then(KeyLocks::default);
        Ok(Self {
            store,
            cache,
            config,
            clock: Arc::new(Utc::now),
            locks,
        })
    }

    /// Replace the wall clock used for time windows.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Antibiogram of the subject at `subject_index`, served from the cache
    /// when present and computed and cached otherwise.
    ///
    /// A cached payload that fails to decode is an error; the entry is not
    /// replaced. A cache write failure discards the computed result.
    pub async fn get_or_compute(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        kind: SubjectKind,
        subject_index: usize,
    ) -> AntibugResult<SubjectAntibiogram> {
        filter.validate()?;
        let subject = filter.subject(subject_index)?;
        let key = fingerprint_for_subject(filter, kind, &subject.id);

        if let Some(cached) = self.read_cached(ctx, &key, subject).await? {
            return Ok(cached);
        }

        let Some(locks) = &self.locks else {
            return self.compute_and_store(ctx, filter, kind, subject, &key).await;
        };

        let _guard = ctx
            .run("acquire key lock", async { Ok(locks.acquire(key).await) })
            .await?;
        match self.read_cached(ctx, &key, subject).await? {
            Some(cached) => Ok(cached),
            None => self.compute_and_store(ctx, filter, kind, subject, &key).await,
        }
    }

    async fn read_cached(
        &self,
        ctx: &RequestContext,
        key: &Fingerprint,
        subject: &SubjectRef,
    ) -> AntibugResult<Option<SubjectAntibiogram>> {
        let cached = ctx
            .run("cache get", self.cache.get(key.as_bytes()))
            .await?;

        match cached {
            Some(bytes) => {
                debug!(subject_id = %subject.id, key = %key, "antibiogram cache hit");
                let mut antibiogram = codec::decode(&bytes)?;
                // Keys carry the subject id only; report the requested name.
                antibiogram.subject_name.clone_from(&subject.name);
                Ok(Some(antibiogram))
            }
            None => {
                debug!(subject_id = %subject.id, key = %key, "antibiogram cache miss");
                Ok(None)
            }
        }
    }

    async fn compute_and_store(
        &self,
        ctx: &RequestContext,
        filter: &Filter,
        kind: SubjectKind,
        subject: &SubjectRef,
        key: &Fingerprint,
    ) -> AntibugResult<SubjectAntibiogram> {
        let query = CultureQuery::from_filter(filter, (self.clock)())?
            .with_subject(kind, subject.id.clone());

        let records = ctx.run("culture find", self.store.find(&query)).await?;
        debug!(
            subject_id = %subject.id,
            kind = %kind,
            records = records.len(),
            "culture records loaded"
        );

        let antibiogram = aggregate(&records, subject, kind);
        let payload = codec::encode(&antibiogram)?;

        ctx.run(
            "cache set",
            self.cache
                .set(key.as_bytes(), &payload, self.config.cache_ttl),
        )
        .await?;

        Ok(antibiogram)
    }
}
