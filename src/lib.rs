//! Effect Cache - A concurrent memoizing cache
//!
//! Values are computed by a user-supplied async lookup, shared between
//! concurrent callers, expired by a time-to-live policy and evicted in
//! least-recently-used order once the cache is over capacity.
//!
//! ```
//! use effect_cache::{Cache, TimeToLive};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: Cache<u32, u32, String> =
//!     Cache::make(100, TimeToLive::Infinite, |key: u32| async move { Ok(key * 2) });
//!
//! assert_eq!(cache.get(21).await, Ok(42));
//! assert!(cache.has(&21));
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, CacheStats, TimeToLive};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{CacheError, ConfigError};
pub use tasks::spawn_cleanup_task;
