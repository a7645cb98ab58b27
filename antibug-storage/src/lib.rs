//! Antibug Storage - Stores, Queries and Caches
//!
//! Defines the culture store abstraction, the normalization of request
//! filters into store queries, and the cache backends antibiograms are
//! kept in. The PostgreSQL store is available behind the `postgres` feature.

pub mod cache;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod sql;
pub mod store;

pub use cache::{
    fingerprint, fingerprint_for_subject, CacheBackend, CacheStats, Fingerprint,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheConfig, LmdbCacheError, FINGERPRINT_LEN,
    SWEEP_EVERY_SETS,
};
#[cfg(feature = "postgres")]
pub use postgres::{PgCultureStore, PgStoreConfig};
pub use query::{CultureQuery, Predicate, RegionField};
pub use sql::{render_select, render_where, SqlParam, SqlWhere};
pub use store::{CultureStore, InMemoryCultureStore};
