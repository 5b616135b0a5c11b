//! Caching layer for querydeck-core
//!
//! Result cache with per-entry TTL and lazy expiry, addressed by
//! deterministic keys derived from query parameters.

pub mod key;
pub mod ttl_cache;

pub use key::{generate_key, namespace};
pub use ttl_cache::{CacheEntry, CacheStats, TtlCache};
