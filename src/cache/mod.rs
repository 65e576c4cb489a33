//! Cache Module
//!
//! Provides a memoizing cache with single-flight lookups, TTL expiration and
//! LRU eviction.

mod builder;
mod deferred;
mod entry;
mod lru_map;
mod stats;
mod store;


// Re-export public types
pub use builder::CacheBuilder;
pub use deferred::{Completer, Deferred};
pub use entry::{CacheEntry, Expiry, TimeToLive};
pub use lru_map::LruMap;
pub use stats::CacheStats;
pub use store::Cache;
