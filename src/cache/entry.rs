//! Cache Entry Module
//!
//! Defines cache entries, their expiration state and time-to-live policy.

use std::time::Duration;

use crate::cache::Deferred;

// == Time To Live ==
/// How long a settled lookup stays cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TimeToLive {
    /// Entry never expires from age
    #[default]
    Infinite,
    /// Entry expires after the given duration; zero means "do not cache"
    Finite(Duration),
}

impl TimeToLive {
    /// A time-to-live that makes every outcome uncacheable.
    pub const ZERO: TimeToLive = TimeToLive::Finite(Duration::ZERO);

    /// Shorthand for `Finite(Duration::from_millis(millis))`.
    pub fn from_millis(millis: u64) -> Self {
        TimeToLive::Finite(Duration::from_millis(millis))
    }

    /// Returns true if outcomes with this policy must not be stored.
    pub fn is_zero(&self) -> bool {
        matches!(self, TimeToLive::Finite(d) if d.is_zero())
    }

    /// Computes the expiry of an entry settled at `now_millis`.
    ///
    /// Returns `None` for a zero duration.
    pub fn expiry_from(&self, now_millis: u64) -> Option<Expiry> {
        match self {
            _ if self.is_zero() => None,
            TimeToLive::Infinite => Some(Expiry::Never),
            TimeToLive::Finite(d) => {
                let ttl = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                Some(Expiry::At(now_millis.saturating_add(ttl)))
            }
        }
    }
}

impl From<Duration> for TimeToLive {
    fn from(d: Duration) -> Self {
        TimeToLive::Finite(d)
    }
}

// == Expiry ==
/// Expiration state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Lookup still in flight; expiration not known yet
    Pending,
    /// Settled with an infinite time-to-live
    Never,
    /// Settled; expires at this timestamp (milliseconds)
    At(u64),
}

// == Cache Entry ==
/// A single slot of the cache.
///
/// The entry is replaced wholesale on `set`/`refresh`; only `expiry` is ever
/// updated in place, when the entry's own lookup settles.
#[derive(Debug)]
pub struct CacheEntry<V, E> {
    /// Identity used to recognise this entry when its lookup settles
    pub id: u64,
    /// Expiration state
    pub expiry: Expiry,
    /// Outcome of the lookup that produced this entry
    pub deferred: Deferred<V, E>,
}

impl<V, E> CacheEntry<V, E> {
    // == Constructors ==
    /// Creates a placeholder for an in-flight lookup.
    pub fn pending(id: u64, deferred: Deferred<V, E>) -> Self {
        Self {
            id,
            expiry: Expiry::Pending,
            deferred,
        }
    }

    /// Creates a settled entry.
    pub fn settled(id: u64, deferred: Deferred<V, E>, expiry: Expiry) -> Self {
        Self {
            id,
            expiry,
            deferred,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once `now_millis >= expires_at`. Pending entries
    /// are never age-expired, but an entry whose lookup was abandoned is
    /// treated as expired so the next read starts over.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        match self.expiry {
            Expiry::At(expires) => now_millis >= expires,
            Expiry::Never => false,
            Expiry::Pending => self.deferred.is_abandoned(),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(value: &str) -> Deferred<String, String> {
        Deferred::resolved(Ok(value.to_string()))
    }

    #[test]
    fn test_entry_never_expires() {
        let entry = CacheEntry::settled(1, resolved("v"), Expiry::Never);

        assert!(!entry.is_expired(u64::MAX));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = CacheEntry::settled(1, resolved("v"), Expiry::At(1_000));

        assert!(!entry.is_expired(999));
        assert!(entry.is_expired(1_000), "Entry should be expired at boundary");
        assert!(entry.is_expired(1_001));
    }

    #[test]
    fn test_pending_entry_is_live_until_abandoned() {
        let (deferred, completer) = Deferred::<String, String>::pending();
        let entry = CacheEntry::pending(1, deferred);

        assert!(!entry.is_expired(u64::MAX));

        drop(completer);
        assert!(entry.is_expired(0));
    }

    #[test]
    fn test_ttl_expiry_from() {
        assert_eq!(TimeToLive::Infinite.expiry_from(5), Some(Expiry::Never));
        assert_eq!(TimeToLive::ZERO.expiry_from(5), None);
        assert_eq!(TimeToLive::from_millis(10).expiry_from(5), Some(Expiry::At(15)));
        assert_eq!(
            TimeToLive::Finite(Duration::MAX).expiry_from(5),
            Some(Expiry::At(u64::MAX))
        );
    }

    #[test]
    fn test_ttl_zero_detection() {
        assert!(TimeToLive::ZERO.is_zero());
        assert!(!TimeToLive::from_millis(1).is_zero());
        assert!(!TimeToLive::default().is_zero());
    }
}
