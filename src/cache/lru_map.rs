//! LRU Map Module
//!
//! Ordered key-to-entry map backing the cache.

use std::hash::Hash;

use lru::LruCache;

// == LRU Map ==
/// Hash map that remembers the order in which keys were inserted or promoted.
///
/// Wraps an unbounded `lru::LruCache`, which keeps a doubly-linked list
/// through its hash index, so moving a key to the back is O(1). Capacity is
/// not enforced here; the cache evicts through [`LruMap::pop_oldest`].
///
/// - Front = oldest (next eviction candidate)
/// - Back = most recently inserted or promoted
#[derive(Debug)]
pub struct LruMap<K, V>
where
    K: Hash + Eq,
{
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> LruMap<K, V> {
    // == Constructor ==
    /// Creates a new empty map.
    pub fn new() -> Self {
        Self {
            inner: LruCache::unbounded(),
        }
    }

    // == Peek ==
    /// Returns the value for `key` without changing its position.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    /// Returns a mutable reference without changing its position.
    pub fn peek_mut(&mut self, key: &K) -> Option<&mut V> {
        self.inner.peek_mut(key)
    }

    // == Promote ==
    /// Moves `key` to the back of the order.
    pub fn promote(&mut self, key: &K) {
        self.inner.promote(key);
    }

    // == Insert ==
    /// Inserts or replaces `key`, placing it at the back.
    ///
    /// Returns the replaced value, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.put(key, value)
    }

    // == Remove ==
    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    // == Pop Oldest ==
    /// Removes and returns the entry at the front.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        self.inner.pop_lru()
    }

    // == Length ==
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    // == Is Empty ==
    /// Returns true if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    // == Iter ==
    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().rev()
    }
}

impl<K: Hash + Eq, V> Default for LruMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
