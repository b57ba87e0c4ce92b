//! Process-local cache for reference data
//!
//! Categories, violation types and hearing officers are read on almost every
//! form render and change rarely. They are memoised in an [`EphemeralCache`]
//! with lazy expiry.
//!
//! The cache never invalidates itself. Whoever writes reference data (the
//! migration runner, admin handlers) clears the matching key from [`keys`].

pub mod keys;
pub mod reference;
pub mod store;

pub use keys::{key_for_collection, CATEGORIES, HEARING_OFFICERS, VIOLATION_TYPES};
pub use reference::{MongoReferenceSource, ReferenceData, ReferenceSource};
pub use store::{CacheStats, EphemeralCache};

use std::time::Duration;

/// Default time-to-live: 30 minutes
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// TTL used when `set` is not given one
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            default_ttl: DEFAULT_TTL,
        }
    }
}

impl CacheConfig {
    /// Create config from environment or defaults
    pub fn from_env() -> Self {
        let max_entries = std::env::var("CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1_000);

        let ttl_secs = std::env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TTL.as_secs());

        Self {
            max_entries,
            default_ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Override the default TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(1800));
        assert_eq!(config.max_entries, 1_000);
    }
}
