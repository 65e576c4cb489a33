//! Cache Builder Module
//!
//! Collects construction options for a [`Cache`].

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::cache::store::{boxed_lookup, Shared, State, TimeToLiveFn};
use crate::cache::{Cache, TimeToLive};
use crate::clock::{Clock, SystemClock};

// == Cache Builder ==
/// Builder for [`Cache`].
///
/// Defaults to an infinite time-to-live and the system clock.
pub struct CacheBuilder<K, V, E> {
    capacity: usize,
    time_to_live: TimeToLiveFn<K, V, E>,
    clock: Arc<dyn Clock>,
}

impl<K, V, E> CacheBuilder<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a builder for a cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is accepted and retains nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            time_to_live: Arc::new(|_: &Result<V, E>, _: &K| TimeToLive::Infinite),
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses the same time-to-live for every outcome.
    pub fn time_to_live(mut self, time_to_live: impl Into<TimeToLive>) -> Self {
        let time_to_live = time_to_live.into();
        self.time_to_live = Arc::new(move |_: &Result<V, E>, _: &K| time_to_live);
        self
    }

    /// Chooses the time-to-live per outcome and key.
    pub fn time_to_live_with<T>(mut self, time_to_live: T) -> Self
    where
        T: Fn(&Result<V, E>, &K) -> TimeToLive + Send + Sync + 'static,
    {
        self.time_to_live = Arc::new(time_to_live);
        self
    }

    /// Replaces the clock used for expiration.
    pub fn clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    // == Build ==
    /// Builds the cache around `lookup`.
    ///
    /// The tokio runtime current at this point, if any, is remembered and used
    /// for lookups requested from outside a runtime.
    pub fn build<F, Fut>(self, lookup: F) -> Cache<K, V, E>
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        Cache::from_shared(Shared {
            state: Mutex::new(State::new()),
            capacity: self.capacity,
            lookup: boxed_lookup(lookup),
            time_to_live: self.time_to_live,
            clock: self.clock,
            runtime: Handle::try_current().ok(),
        })
    }
}
