//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_POST_TTL_SECS: u64 = 360;
const DEFAULT_POST_LIMIT: usize = 1000;

/// Post cache configuration from the `[cache]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Put the TTL cache in front of the post repository.
    pub enabled: bool,
    /// Lifetime of a cached post in seconds.
    pub post_ttl_seconds: u64,
    /// Maximum posts held before least-recently-used entries are evicted.
    pub post_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            post_ttl_seconds: DEFAULT_POST_TTL_SECS,
            post_limit: DEFAULT_POST_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            post_ttl_seconds: settings.post_ttl.as_secs(),
            post_limit: settings.post_limit.get(),
        }
    }
}

impl CacheConfig {
    pub fn post_ttl(&self) -> Duration {
        Duration::from_secs(self.post_ttl_seconds.max(1))
    }

    /// Returns the post limit as NonZeroUsize, clamping to 1 if zero.
    pub fn post_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.post_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
