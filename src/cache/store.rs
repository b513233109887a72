//! Bounded key/value store with per-entry expiry.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Counter names a store reports to.
#[derive(Debug, Clone, Copy)]
pub struct CacheMetrics {
    pub hit: &'static str,
    pub miss: &'static str,
    pub evict: &'static str,
}

pub const POST_CACHE_METRICS: CacheMetrics = CacheMetrics {
    hit: "quaderno_post_cache_hit_total",
    miss: "quaderno_post_cache_miss_total",
    evict: "quaderno_post_cache_evict_total",
};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Snapshot of a cache's removal count, taken before reading from the
/// backing store. See [`TtlCache::fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// Thread-safe LRU map whose entries lapse after their TTL.
///
/// Expired entries count as misses and are dropped when touched. Capacity
/// evictions drop the least recently used entry.
pub struct TtlCache<K: Hash + Eq, V> {
    entries: RwLock<LruCache<K, Entry<V>>>,
    /// Bumped under the write lock by every `delete` and `clear`.
    removals: AtomicU64,
    metrics: CacheMetrics,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: NonZeroUsize, metrics: CacheMetrics) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            removals: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let now = Instant::now();

        let lookup = entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        let fresh = match lookup {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                counter!(self.metrics.evict, "reason" => "expired").increment(1);
                None
            }
            None => None,
        };

        match fresh {
            Some(value) => {
                counter!(self.metrics.hit).increment(1);
                Some(value)
            }
            None => {
                counter!(self.metrics.miss).increment(1);
                None
            }
        }
    }

    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        self.push(&mut entries, key, value, ttl);
    }

    /// Take a ticket before loading a value that will be passed to [`fill`].
    ///
    /// [`fill`]: TtlCache::fill
    pub fn fill_ticket(&self) -> FillTicket {
        FillTicket(self.removals.load(Ordering::Acquire))
    }

    /// Insert `value` only if nothing was deleted since `ticket` was taken.
    ///
    /// A value loaded before a concurrent delete may describe a row that no
    /// longer exists, so it is dropped instead of cached. Returns `true` when
    /// the entry was stored.
    pub fn fill(&self, ticket: FillTicket, key: K, value: V, ttl: Duration) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "fill");
        if self.removals.load(Ordering::Acquire) != ticket.0 {
            return false;
        }
        self.push(&mut entries, key, value, ttl);
        true
    }

    /// Returns `true` when an entry was present.
    pub fn delete(&self, key: &K) -> bool {
        let mut entries = rw_write(&self.entries, SOURCE, "delete");
        self.removals.fetch_add(1, Ordering::AcqRel);
        entries.pop(key).is_some()
    }

    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "contains")
            .peek(key)
            .is_some_and(|entry| entry.expires_at > now)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        self.removals.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    fn push(&self, entries: &mut LruCache<K, Entry<V>>, key: K, value: V, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        let displaced = entries.push(key.clone(), entry);

        if matches!(displaced, Some((old_key, _)) if old_key != key) {
            counter!(self.metrics.evict, "reason" => "capacity").increment(1);
        }
    }
}
