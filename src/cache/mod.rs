//! Post cache.
//!
//! A bounded TTL store ([`TtlCache`]) and a repository decorator
//! ([`CachedPostsRepo`]) that keeps it coherent with the post repository.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! post_ttl_seconds = 360
//! post_limit = 1000
//! ```

mod config;
mod lock;
mod posts;
mod store;

pub use config::CacheConfig;
pub use posts::{CachedPostsRepo, PostCache};
pub use store::{CacheMetrics, FillTicket, POST_CACHE_METRICS, TtlCache};
