//! Object cache.
//!
//! Bounded in-memory store of response bodies keyed by request target, with a
//! total byte budget and least-recently-used eviction. One [`ObjectCache`] is
//! built at startup and shared by every connection handler through an `Arc`.

mod entry;
mod stats;
mod store;

use serde::Deserialize;
use thiserror::Error;

pub use entry::CacheEntry;
pub use stats::CacheStats;
pub use store::{Insertion, ObjectCache};

/// Default total byte budget across all cached bodies.
pub const MAX_CACHE_SIZE: usize = 1_049_000;

/// Default largest body that may be cached.
pub const MAX_OBJECT_SIZE: usize = 102_400;

/// How a request target is turned into a cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheKeyMode {
    /// The path (with any query) alone; every origin shares one namespace.
    #[default]
    Path,
    /// `host:port` followed by the path.
    Authority,
}

impl CacheKeyMode {
    /// Builds the key for a resolved target.
    ///
    /// ```
    /// use cacheproxy::cache::CacheKeyMode;
    ///
    /// assert_eq!(CacheKeyMode::Path.key("example.com", 80, "/a?b"), "/a?b");
    /// assert_eq!(CacheKeyMode::Authority.key("example.com", 80, "/a"), "example.com:80/a");
    /// ```
    pub fn key(self, host: &str, port: u16, path: &str) -> String {
        match self {
            Self::Path => path.to_owned(),
            Self::Authority => format!("{host}:{port}{path}"),
        }
    }
}

/// Size limits the cache enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Upper bound on the sum of all cached body sizes.
    pub max_cache_size: usize,
    /// Bodies larger than this are relayed but never stored.
    pub max_object_size: usize,
}

impl CacheLimits {
    /// Checks that a single admissible object can always fit the budget.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ObjectExceedsBudget`] if `max_object_size > max_cache_size`,
    /// or [`CacheError::ZeroBudget`] if the budget is zero.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_cache_size == 0 {
            return Err(CacheError::ZeroBudget);
        }
        if self.max_object_size > self.max_cache_size {
            return Err(CacheError::ObjectExceedsBudget {
                max_object_size: self.max_object_size,
                max_cache_size: self.max_cache_size,
            });
        }
        Ok(())
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_cache_size: MAX_CACHE_SIZE,
            max_object_size: MAX_OBJECT_SIZE,
        }
    }
}

/// Errors raised when constructing a cache.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error(
        "max object size ({max_object_size} bytes) exceeds the cache budget ({max_cache_size} bytes)"
    )]
    ObjectExceedsBudget {
        max_object_size: usize,
        max_cache_size: usize,
    },

    #[error("cache budget must be greater than zero")]
    ZeroBudget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_are_valid() {
        assert_eq!(CacheLimits::default().validate(), Ok(()));
    }

    #[test]
    fn object_larger_than_budget_is_rejected() {
        let limits = CacheLimits {
            max_cache_size: 100,
            max_object_size: 101,
        };
        assert!(matches!(
            limits.validate(),
            Err(CacheError::ObjectExceedsBudget { .. })
        ));
    }

    #[test]
    fn zero_budget_is_rejected() {
        let limits = CacheLimits {
            max_cache_size: 0,
            max_object_size: 0,
        };
        assert_eq!(limits.validate(), Err(CacheError::ZeroBudget));
    }
}
