//! Background Tasks Module
//!
//! Contains background tasks that keep a cache tidy while it is in use.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired cache entries at a fixed interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
