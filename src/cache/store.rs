//! Cache Store Module
//!
//! Memoizing cache combining an ordered entry map with single-flight lookups,
//! TTL expiration and capacity eviction.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::cache::{
    CacheBuilder, CacheEntry, CacheStats, Completer, Deferred, LruMap, TimeToLive,
};
use crate::clock::Clock;
use crate::error::Result;

pub(crate) type LookupFn<K, V, E> =
    Arc<dyn Fn(K) -> BoxFuture<'static, std::result::Result<V, E>> + Send + Sync>;

pub(crate) type TimeToLiveFn<K, V, E> =
    Arc<dyn Fn(&std::result::Result<V, E>, &K) -> TimeToLive + Send + Sync>;

// == Cache ==
/// A concurrent memoizing cache.
///
/// Values are produced by a lookup function the first time a key is requested.
/// Concurrent requests for a key whose lookup is still running share that one
/// lookup. Settled entries live for the duration chosen by the time-to-live
/// policy, and the oldest entries are evicted once the cache holds more than
/// `capacity` of them.
///
/// `Cache` is a cheap handle; clones share the same entries.
pub struct Cache<K, V, E>
where
    K: Hash + Eq,
{
    shared: Arc<Shared<K, V, E>>,
}

pub(crate) struct Shared<K, V, E>
where
    K: Hash + Eq,
{
    pub(crate) state: Mutex<State<K, V, E>>,
    pub(crate) capacity: usize,
    pub(crate) lookup: LookupFn<K, V, E>,
    pub(crate) time_to_live: TimeToLiveFn<K, V, E>,
    pub(crate) clock: Arc<dyn Clock>,
    /// Runtime current when the cache was built
    pub(crate) runtime: Option<Handle>,
}

pub(crate) struct State<K, V, E>
where
    K: Hash + Eq,
{
    entries: LruMap<K, CacheEntry<V, E>>,
    stats: CacheStats,
    next_id: u64,
}

/// Where a settled lookup writes its outcome.
enum Slot<V, E> {
    /// Update the placeholder with this id, if it is still in the map
    Placeholder(u64),
    /// Install a new entry holding `deferred`, if the entry with id
    /// `replaces` is still in the map
    Replace {
        deferred: Deferred<V, E>,
        replaces: u64,
    },
}

/// Result of the atomic check-then-insert performed by `get`.
enum Registration<V, E> {
    Hit(Deferred<V, E>),
    Miss {
        deferred: Deferred<V, E>,
        completer: Completer<V, E>,
        id: u64,
    },
}

impl<K, V, E> State<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: LruMap::new(),
            stats: CacheStats::new(),
            next_id: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    // == Live Entry ==
    /// Returns the id and deferred of the live entry for `key`.
    ///
    /// An expired entry found here is removed.
    fn live_entry(&mut self, key: &K, now_millis: u64) -> Option<(u64, Deferred<V, E>)> {
        let expired = self.entries.peek(key)?.is_expired(now_millis);
        if expired {
            self.entries.remove(key);
            self.stats.record_expirations(1);
            self.sync_total_entries();
            return None;
        }
        self.entries
            .peek(key)
            .map(|entry| (entry.id, entry.deferred.clone()))
    }

    fn live(&mut self, key: &K, now_millis: u64) -> Option<Deferred<V, E>> {
        self.live_entry(key, now_millis).map(|(_, deferred)| deferred)
    }

    /// Returns true if `key` still maps to the entry with this id.
    fn holds(&self, key: &K, id: u64) -> bool {
        self.entries.peek(key).is_some_and(|entry| entry.id == id)
    }

    fn sync_total_entries(&mut self) {
        self.stats.set_total_entries(self.entries.len());
    }

    /// Inserts a placeholder for a lookup about to start.
    fn insert_placeholder(
        &mut self,
        key: K,
        capacity: usize,
    ) -> (u64, Deferred<V, E>, Completer<V, E>) {
        let id = self.next_id();
        let (deferred, completer) = Deferred::pending();
        self.entries
            .insert(key, CacheEntry::pending(id, deferred.clone()));
        self.evict_overflow(capacity);
        (id, deferred, completer)
    }

    // == Capacity Eviction ==
    /// Removes the oldest entries until at most `capacity` remain.
    fn evict_overflow(&mut self, capacity: usize) -> usize {
        let overflow = self.entries.len().saturating_sub(capacity);
        let mut evicted = 0;
        while evicted < overflow && self.entries.pop_oldest().is_some() {
            evicted += 1;
        }
        if evicted > 0 {
            self.stats.record_evictions(evicted);
            debug!(evicted, capacity, "Evicted entries over capacity");
        }
        self.sync_total_entries();
        evicted
    }

    // == Purge Expired ==
    /// Removes every entry that has expired.
    fn purge_expired(&mut self, now_millis: u64) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now_millis))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
        }

        self.stats.record_expirations(expired.len());
        self.sync_total_entries();
        expired.len()
    }
}

impl<K, V, E> Shared<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Settle ==
    /// Records the outcome of a finished lookup.
    ///
    /// The map update and the completion happen under one lock, so a reader
    /// never sees a settled entry with an unresolved deferred or vice versa.
    /// The outcome is stored only if the entry the lookup was started for is
    /// still in the map; otherwise it only reaches the lookup's awaiters.
    fn settle(
        &self,
        key: K,
        completer: Completer<V, E>,
        outcome: std::result::Result<V, E>,
        slot: Slot<V, E>,
    ) {
        let time_to_live = (self.time_to_live)(&outcome, &key);
        let now = self.clock.now_millis();
        let expiry = time_to_live.expiry_from(now);

        let mut state = self.state.lock();
        match slot {
            Slot::Placeholder(id) if state.holds(&key, id) => match expiry {
                Some(expiry) => {
                    if let Some(entry) = state.entries.peek_mut(&key) {
                        entry.expiry = expiry;
                    }
                }
                None => {
                    state.entries.remove(&key);
                    debug!(id, "Dropped entry with zero time-to-live");
                }
            },
            Slot::Replace { deferred, replaces } if state.holds(&key, replaces) => match expiry {
                Some(expiry) => {
                    let id = state.next_id();
                    state
                        .entries
                        .insert(key, CacheEntry::settled(id, deferred, expiry));
                    state.evict_overflow(self.capacity);
                }
                None => {
                    state.entries.remove(&key);
                    debug!(replaces, "Dropped refreshed entry with zero time-to-live");
                }
            },
            _ => trace!("Entry replaced before its lookup settled"),
        }
        completer.complete(outcome);
        state.sync_total_entries();
    }
}

impl<K, V, E> Cache<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    // == Constructors ==
    /// Creates a cache whose entries all live for the same duration.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries retained
    /// * `time_to_live` - Lifetime of every settled entry
    /// * `lookup` - Computes the value for a missing key
    pub fn make<F, Fut>(capacity: usize, time_to_live: impl Into<TimeToLive>, lookup: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
    {
        CacheBuilder::new(capacity)
            .time_to_live(time_to_live)
            .build(lookup)
    }

    /// Creates a cache whose entry lifetime depends on the lookup outcome.
    ///
    /// `time_to_live` is called once per settled lookup (and per `set`).
    pub fn make_with_ttl<F, Fut, T>(capacity: usize, lookup: F, time_to_live: T) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        T: Fn(&std::result::Result<V, E>, &K) -> TimeToLive + Send + Sync + 'static,
    {
        CacheBuilder::new(capacity)
            .time_to_live_with(time_to_live)
            .build(lookup)
    }

    /// Starts building a cache with the given capacity.
    pub fn builder(capacity: usize) -> CacheBuilder<K, V, E> {
        CacheBuilder::new(capacity)
    }

    pub(crate) fn from_shared(shared: Shared<K, V, E>) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    fn now(&self) -> u64 {
        self.shared.clock.now_millis()
    }

    // == Get ==
    /// Returns the value for `key`, running the lookup if the key is absent
    /// or expired.
    ///
    /// Callers arriving while a lookup for `key` is in flight wait for that
    /// lookup instead of starting another. A lookup failure is returned to
    /// every waiting caller.
    pub async fn get(&self, key: K) -> Result<V, E> {
        let deferred = match self.register(&key) {
            Registration::Hit(deferred) => deferred,
            Registration::Miss {
                deferred,
                completer,
                id,
            } => {
                self.launch(key, completer, Slot::Placeholder(id)).await;
                deferred
            }
        };
        deferred.wait().await
    }

    /// Atomically decides hit or miss, inserting a placeholder on a miss.
    fn register(&self, key: &K) -> Registration<V, E> {
        let now = self.now();
        let mut state = self.shared.state.lock();

        if let Some(deferred) = state.live(key, now) {
            state.entries.promote(key);
            state.stats.record_hit();
            trace!("Cache hit");
            return Registration::Hit(deferred);
        }

        state.stats.record_miss();
        state.stats.record_lookup();
        let (id, deferred, completer) =
            state.insert_placeholder(key.clone(), self.shared.capacity);
        debug!(id, "Cache miss, starting lookup");
        Registration::Miss {
            deferred,
            completer,
            id,
        }
    }

    /// Runs the lookup for `key` and settles its outcome into `slot`.
    ///
    /// The lookup is spawned on the caller's tokio runtime, or on the runtime
    /// the cache was built on, so it settles even if the caller goes away.
    /// Outside of any runtime it runs inline.
    async fn launch(&self, key: K, completer: Completer<V, E>, slot: Slot<V, E>) {
        let shared = Arc::clone(&self.shared);
        let task = async move {
            let outcome = (shared.lookup)(key.clone()).await;
            shared.settle(key, completer, outcome, slot);
        };

        match Handle::try_current()
            .ok()
            .or_else(|| self.shared.runtime.clone())
        {
            Some(handle) => {
                handle.spawn(task);
            }
            None => task.await,
        }
    }

    // == Get Option ==
    /// Returns the value for `key` if a live entry exists, without running
    /// the lookup.
    ///
    /// Waits if the entry's lookup is still in flight, and returns its error
    /// if that lookup failed.
    pub async fn get_option(&self, key: &K) -> Result<Option<V>, E> {
        let deferred = {
            let now = self.now();
            let mut state = self.shared.state.lock();
            match state.live(key, now) {
                Some(deferred) => {
                    state.entries.promote(key);
                    state.stats.record_hit();
                    deferred
                }
                None => {
                    state.stats.record_miss();
                    return Ok(None);
                }
            }
        };
        deferred.wait().await.map(Some)
    }

    // == Get Success ==
    /// Returns the value for `key` only if its lookup already succeeded.
    ///
    /// Never waits: in-flight and failed entries yield `None`.
    pub fn get_success(&self, key: &K) -> Option<V> {
        let now = self.now();
        let mut state = self.shared.state.lock();
        let value = state.live(key, now).and_then(|deferred| deferred.success());
        match value {
            Some(_) => {
                state.entries.promote(key);
                state.stats.record_hit();
            }
            None => state.stats.record_miss(),
        }
        value
    }

    // == Has ==
    /// Returns true if `key` holds a live entry, settled or not.
    ///
    /// Does not affect eviction order.
    pub fn has(&self, key: &K) -> bool {
        let now = self.now();
        self.shared.state.lock().live(key, now).is_some()
    }

    // == Set ==
    /// Stores `value` for `key` without running the lookup.
    ///
    /// The time-to-live policy still applies; a zero time-to-live leaves the
    /// key absent.
    pub fn set(&self, key: K, value: V) {
        let outcome = Ok(value);
        let expiry = (self.shared.time_to_live)(&outcome, &key).expiry_from(self.now());

        let mut state = self.shared.state.lock();
        match expiry {
            Some(expiry) => {
                let id = state.next_id();
                let entry = CacheEntry::settled(id, Deferred::resolved(outcome), expiry);
                state.entries.insert(key, entry);
                state.evict_overflow(self.shared.capacity);
            }
            None => {
                state.entries.remove(&key);
                state.sync_total_entries();
            }
        }
    }

    // == Invalidate ==
    /// Removes `key` if present.
    pub fn invalidate(&self, key: &K) {
        let mut state = self.shared.state.lock();
        state.entries.remove(key);
        state.sync_total_entries();
    }

    /// Removes `key` if its lookup succeeded with a value matching
    /// `predicate`.
    ///
    /// In-flight, failed, expired and absent entries are left alone. The
    /// predicate runs without the cache locked and may use the cache; if the
    /// entry is replaced meanwhile, the replacement is kept. Returns whether
    /// an entry was removed.
    pub fn invalidate_when<P>(&self, key: &K, predicate: P) -> bool
    where
        P: FnOnce(&V) -> bool,
    {
        let now = self.now();
        let snapshot = self
            .shared
            .state
            .lock()
            .live_entry(key, now)
            .and_then(|(id, deferred)| deferred.success().map(|value| (id, value)));

        let Some((id, value)) = snapshot else {
            return false;
        };
        if !predicate(&value) {
            return false;
        }

        let mut state = self.shared.state.lock();
        if !state.holds(key, id) {
            trace!(id, "Entry replaced while its predicate ran");
            return false;
        }
        state.entries.remove(key);
        state.sync_total_entries();
        true
    }

    /// Removes every entry, including those with lookups in flight.
    ///
    /// In-flight lookups keep running; their results are not stored.
    pub fn invalidate_all(&self) {
        let mut state = self.shared.state.lock();
        state.entries.clear();
        state.stats.set_total_entries(0);
    }

    // == Refresh ==
    /// Runs the lookup for `key` even if a live entry exists, and stores the
    /// new outcome.
    ///
    /// While the lookup runs, readers keep seeing the previous entry. A `set`
    /// or invalidation of `key` made meanwhile wins over the refreshed
    /// outcome. When no live entry exists this behaves like a `get` miss.
    pub async fn refresh(&self, key: K) -> Result<V, E> {
        let (deferred, slot, completer) = {
            let now = self.now();
            let mut state = self.shared.state.lock();
            state.stats.record_lookup();
            match state.live_entry(&key, now) {
                Some((replaces, _)) => {
                    let (deferred, completer) = Deferred::pending();
                    debug!(replaces, "Refreshing live entry");
                    (deferred.clone(), Slot::Replace { deferred, replaces }, completer)
                }
                None => {
                    let (id, deferred, completer) =
                        state.insert_placeholder(key.clone(), self.shared.capacity);
                    debug!(id, "Refreshing absent entry");
                    (deferred, Slot::Placeholder(id), completer)
                }
            }
        };
        self.launch(key, completer, slot).await;
        deferred.wait().await
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.now();
        self.shared.state.lock().purge_expired(now)
    }

    // == Accessors ==
    /// Returns the number of entries, including in-flight and not yet
    /// purged expired ones.
    pub fn size(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.entries.len());
        stats
    }

    /// Returns the keys of live entries, oldest first.
    ///
    /// Expired entries found during the scan are removed.
    pub fn keys(&self) -> Vec<K> {
        let now = self.now();
        let mut state = self.shared.state.lock();
        state.purge_expired(now);
        state.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Returns the values of live entries whose lookup succeeded, oldest first.
    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Returns the key-value pairs of live entries whose lookup succeeded,
    /// oldest first.
    pub fn entries(&self) -> Vec<(K, V)> {
        let now = self.now();
        let mut state = self.shared.state.lock();
        state.purge_expired(now);
        state
            .entries
            .iter()
            .filter_map(|(key, entry)| {
                entry
                    .deferred
                    .success()
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }
}

impl<K, V, E> Clone for Cache<K, V, E>
where
    K: Hash + Eq,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V, E> fmt::Debug for Cache<K, V, E>
where
    K: Hash + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.shared.capacity)
            .field("size", &self.shared.state.lock().entries.len())
            .finish()
    }
}

pub(crate) fn boxed_lookup<K, V, E, F, Fut>(lookup: F) -> LookupFn<K, V, E>
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
{
    Arc::new(move |key| lookup(key).boxed())
}
