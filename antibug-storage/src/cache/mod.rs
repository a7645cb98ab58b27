//! Antibiogram cache layer.
//!
//! Byte-oriented [`CacheBackend`]s keyed by request [`Fingerprint`]s. Values
//! are opaque to the backend; the engine owns their encoding.
//!
//! Two backends are provided:
//! - [`InMemoryCacheBackend`] for tests and single-process use
//! - [`LmdbCacheBackend`] for a persistent cache that survives restarts

pub mod fingerprint;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use fingerprint::{
    fingerprint, fingerprint_for_subject, fingerprint_material, Fingerprint, FINGERPRINT_LEN,
};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheConfig, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats, SWEEP_EVERY_SETS};
