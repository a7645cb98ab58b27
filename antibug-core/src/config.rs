//! Engine configuration

use crate::{AntibugError, AntibugResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Expiry applied to every cached antibiogram.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Subjects computed at once by a batch request.
pub const DEFAULT_MAX_CONCURRENT_SUBJECTS: usize = 4;

/// Configuration for the antibiogram engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// TTL for cache entries written on a miss.
    pub cache_ttl: Duration,
    /// Upper bound on subjects computed concurrently in a batch.
    /// `1` reproduces the sequential reference behavior.
    pub max_concurrent_subjects: usize,
    /// Serialize compute-and-populate per cache key.
    pub single_flight: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            max_concurrent_subjects: DEFAULT_MAX_CONCURRENT_SUBJECTS,
            single_flight: false,
        }
    }
}

impl EngineConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `ANTIBUG_CACHE_TTL_SECS`: cache entry TTL in seconds (default: 604800)
    /// - `ANTIBUG_MAX_CONCURRENT_SUBJECTS`: batch concurrency (default: 4)
    /// - `ANTIBUG_SINGLE_FLIGHT`: `true`/`1` to enable per-key locking (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_ttl: std::env::var("ANTIBUG_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            max_concurrent_subjects: std::env::var("ANTIBUG_MAX_CONCURRENT_SUBJECTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_subjects),
            single_flight: std::env::var("ANTIBUG_SINGLE_FLIGHT")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.single_flight),
        }
    }

    /// Set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the batch concurrency limit.
    pub fn with_max_concurrent_subjects(mut self, max: usize) -> Self {
        self.max_concurrent_subjects = max;
        self
    }

    /// Enable or disable per-key single-flight.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - cache_ttl is positive
    /// - max_concurrent_subjects > 0
    pub fn validate(&self) -> AntibugResult<()> {
        if self.cache_ttl.is_zero() {
            return Err(AntibugError::Config(ConfigError::InvalidValue {
                field: "cache_ttl".to_string(),
                value: format!("{:?}", self.cache_ttl),
                reason: "cache_ttl must be positive".to_string(),
            }));
        }

        if self.max_concurrent_subjects == 0 {
            return Err(AntibugError::Config(ConfigError::InvalidValue {
                field: "max_concurrent_subjects".to_string(),
                value: self.max_concurrent_subjects.to_string(),
                reason: "max_concurrent_subjects must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(604_800));
        assert!(!config.single_flight);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = EngineConfig::default().with_cache_ttl(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache_ttl"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EngineConfig::default().with_max_concurrent_subjects(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_subjects"));
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_cache_ttl(Duration::from_secs(60))
            .with_max_concurrent_subjects(1)
            .with_single_flight(true);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_subjects, 1);
        assert!(config.single_flight);
    }
}
