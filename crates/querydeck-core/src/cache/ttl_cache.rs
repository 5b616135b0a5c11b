//! In-memory key/value cache with per-entry TTL
//!
//! Expiry is lazy: an expired entry is only removed when a read discovers it.
//! Size is bounded by [`TtlCache::maintain`], which callers run
//! opportunistically after writes. Two policies are available:
//!
//! - [`EvictionMode::ClearAll`] (default): once the entry count exceeds the
//!   threshold the whole cache is dropped. Crude, but predictable.
//! - [`EvictionMode::Lru`]: a capacity-bounded moka cache evicting the least
//!   recently used keys one at a time.

use crate::clock::{system_clock, SharedClock};
use crate::config::{CacheConfig, EvictionMode};
use dashmap::DashMap;
use moka::policy::EvictionPolicy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Stored value plus its absolute expiry on the cache clock
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Duration,
}

enum Backend<V> {
    ClearAll(DashMap<String, CacheEntry<V>>),
    Lru(moka::sync::Cache<String, CacheEntry<V>>),
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    size_clears: AtomicU64,
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub size_clears: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe TTL cache shared across request handlers
pub struct TtlCache<V> {
    clock: SharedClock,
    default_ttl: Duration,
    max_entries: usize,
    backend: Backend<V>,
    counters: Counters,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Cache with default settings (5 min TTL, clear-all above 1000 entries)
    pub fn new() -> Self {
        Self::from_config(&CacheConfig::default())
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &CacheConfig, clock: SharedClock) -> Self {
        let backend = match config.eviction {
            EvictionMode::ClearAll => Backend::ClearAll(DashMap::new()),
            EvictionMode::Lru => Backend::Lru(
                moka::sync::Cache::builder()
                    .max_capacity(config.max_entries as u64)
                    .eviction_policy(EvictionPolicy::lru())
                    .build(),
            ),
        };

        debug!(
            default_ttl_secs = config.default_ttl().as_secs(),
            max_entries = config.max_entries,
            eviction = ?config.eviction,
            "TTL cache created"
        );

        Self {
            clock,
            default_ttl: config.default_ttl(),
            max_entries: config.max_entries,
            backend,
            counters: Counters::default(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store `value` under `key` with the default TTL
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store `value` under `key`, expiring `ttl` from now
    ///
    /// Overwrites both value and expiry of an existing entry. A TTL reaching
    /// past the end of the clock never expires.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: self.clock.now().checked_add(ttl).unwrap_or(Duration::MAX),
        };
        match &self.backend {
            Backend::ClearAll(map) => {
                map.insert(key.into(), entry);
            }
            Backend::Lru(cache) => cache.insert(key.into(), entry),
        }
    }

    /// Fetch a live value
    ///
    /// An entry is live up to and including its expiry instant; a read after
    /// that removes it and returns `None`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let found = match &self.backend {
            Backend::ClearAll(map) => map.get(key).map(|e| e.value().clone()),
            Backend::Lru(cache) => cache.get(key),
        };

        match found {
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) if now > entry.expires_at => {
                self.remove_expired(key, now);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache entry expired");
                None
            }
            Some(entry) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
        }
    }

    fn remove_expired(&self, key: &str, now: Duration) {
        match &self.backend {
            // Re-check under the shard lock: a concurrent set may have refreshed it
            Backend::ClearAll(map) => {
                map.remove_if(key, |_, e| now > e.expires_at);
            }
            Backend::Lru(cache) => {
                if cache.get(key).is_some_and(|e| now > e.expires_at) {
                    cache.invalidate(key);
                }
            }
        }
    }

    /// Same as `get(key).is_some()`, including the lazy removal
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn delete(&self, key: &str) {
        match &self.backend {
            Backend::ClearAll(map) => {
                map.remove(key);
            }
            Backend::Lru(cache) => cache.invalidate(key),
        }
    }

    /// Drop every key starting with `prefix`, returning how many went
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        match &self.backend {
            Backend::ClearAll(map) => {
                let before = map.len();
                map.retain(|k, _| !k.starts_with(prefix));
                before.saturating_sub(map.len())
            }
            Backend::Lru(cache) => {
                let doomed: Vec<_> = cache
                    .iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| k)
                    .collect();
                for key in &doomed {
                    cache.invalidate(key.as_str());
                }
                doomed.len()
            }
        }
    }

    pub fn clear(&self) {
        match &self.backend {
            Backend::ClearAll(map) => map.clear(),
            Backend::Lru(cache) => {
                cache.invalidate_all();
                cache.run_pending_tasks();
            }
        }
    }

    /// Number of stored entries, expired-but-unread ones included
    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::ClearAll(map) => map.len(),
            Backend::Lru(cache) => {
                cache.run_pending_tasks();
                cache.entry_count() as usize
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enforce the size bound
    ///
    /// Under `ClearAll`, exceeding the threshold empties the entire cache and
    /// returns `true`. Under `Lru` this flushes moka's pending evictions and
    /// always returns `false`.
    pub fn maintain(&self) -> bool {
        match &self.backend {
            Backend::ClearAll(map) => {
                let size = map.len();
                if size > self.max_entries {
                    map.clear();
                    self.counters.size_clears.fetch_add(1, Ordering::Relaxed);
                    info!(
                        size,
                        threshold = self.max_entries,
                        "Cache size over threshold, cleared all entries"
                    );
                    true
                } else {
                    false
                }
            }
            Backend::Lru(cache) => {
                cache.run_pending_tasks();
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len() as u64,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            size_clears: self.counters.size_clears.load(Ordering::Relaxed),
        }
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
