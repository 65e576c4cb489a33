//! Integration Tests for the Cache API
//!
//! Exercises the public API end to end on a multi-threaded runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use effect_cache::{Cache, CacheError, ManualClock, TimeToLive};
use tokio::sync::Notify;

// == Helper Functions ==

type TestCache = Cache<String, String, String>;

/// Cache whose lookup returns `"<key>-<call number>"` after a short delay.
fn create_test_cache(
    capacity: usize,
    time_to_live: TimeToLive,
    clock: &ManualClock,
) -> (TestCache, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cache = Cache::builder(capacity)
        .time_to_live(time_to_live)
        .clock(clock.clone())
        .build(move |key: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, String>(format!("{key}-{n}"))
            }
        });
    (cache, calls)
}

fn key(k: &str) -> String {
    k.to_string()
}

// == Single Flight ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_one_lookup() {
    let clock = ManualClock::new(0);
    let (cache, calls) = create_test_cache(10, TimeToLive::Infinite, &clock);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(key("shared")).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(key("shared-1")));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_do_not_block_each_other() {
    let gate = Arc::new(Notify::new());
    let gate_in = gate.clone();
    let cache: TestCache = Cache::make(10, TimeToLive::Infinite, move |key: String| {
        let gate = gate_in.clone();
        async move {
            if key == "slow" {
                gate.notified().await;
            }
            Ok(key)
        }
    });

    let slow = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(key("slow")).await }
    });

    assert_eq!(cache.get(key("fast")).await, Ok(key("fast")));
    cache.set(key("other"), key("v"));
    assert!(!slow.is_finished());

    gate.notify_one();
    assert_eq!(slow.await.unwrap(), Ok(key("slow")));
}

// == Expiration ==

#[tokio::test]
async fn test_expired_entry_is_looked_up_again() {
    let clock = ManualClock::new(0);
    let (cache, calls) = create_test_cache(10, TimeToLive::from_millis(1_000), &clock);

    assert_eq!(cache.get(key("a")).await, Ok(key("a-1")));
    clock.advance(Duration::from_millis(1_001));
    assert_eq!(cache.get(key("a")).await, Ok(key("a-2")));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_zero_ttl_leaves_no_entry() {
    let clock = ManualClock::new(0);
    let (cache, _) = create_test_cache(10, TimeToLive::ZERO, &clock);

    cache.get(key("a")).await.unwrap();
    cache.set(key("b"), key("v"));

    assert!(!cache.has(&key("a")));
    assert!(!cache.has(&key("b")));
}

#[tokio::test]
async fn test_failures_can_expire_sooner_than_successes() {
    let clock = ManualClock::new(0);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let cache: TestCache = Cache::builder(10)
        .time_to_live_with(|outcome: &Result<String, String>, _key: &String| match outcome {
            Ok(_) => TimeToLive::Infinite,
            Err(_) => TimeToLive::from_millis(100),
        })
        .clock(clock.clone())
        .build(move |key: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    Err(format!("{key} unavailable"))
                } else {
                    Ok(key)
                }
            }
        });

    assert_eq!(
        cache.get(key("a")).await,
        Err(CacheError::Lookup(key("a unavailable")))
    );
    assert_eq!(
        cache.get(key("a")).await,
        Err(CacheError::Lookup(key("a unavailable")))
    );

    clock.advance(Duration::from_millis(100));
    assert_eq!(cache.get(key("a")).await, Ok(key("a")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Capacity ==

#[tokio::test]
async fn test_capacity_eviction_and_promotion() {
    let clock = ManualClock::new(0);
    let (cache, _) = create_test_cache(2, TimeToLive::Infinite, &clock);

    cache.get(key("a")).await.unwrap();
    cache.get(key("b")).await.unwrap();
    cache.get(key("c")).await.unwrap();
    assert_eq!(cache.keys(), vec![key("b"), key("c")]);

    assert_eq!(cache.get_option(&key("b")).await, Ok(Some(key("b-2"))));
    cache.set(key("d"), key("v"));

    assert_eq!(cache.keys(), vec![key("b"), key("d")]);
    assert_eq!(cache.stats().evictions, 2);
}

// == Non-blocking reads ==

#[tokio::test]
async fn test_non_blocking_reads_during_lookup() {
    let gate = Arc::new(Notify::new());
    let gate_in = gate.clone();
    let cache: TestCache = Cache::make(10, TimeToLive::Infinite, move |key: String| {
        let gate = gate_in.clone();
        async move {
            gate.notified().await;
            Ok(key)
        }
    });

    let pending = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(key("a")).await }
    });
    while !cache.has(&key("a")) {
        tokio::task::yield_now().await;
    }

    assert_eq!(cache.get_success(&key("a")), None);
    assert!(!cache.invalidate_when(&key("a"), |_| true));
    assert!(cache.entries().is_empty());

    let a = key("a");
    let mut option = tokio_test::task::spawn(cache.get_option(&a));
    tokio_test::assert_pending!(option.poll());

    gate.notify_one();
    assert_eq!(pending.await.unwrap(), Ok(key("a")));
    assert_eq!(tokio_test::assert_ready!(option.poll()), Ok(Some(key("a"))));
    assert_eq!(cache.entries(), vec![(key("a"), key("a"))]);
}

// == Refresh and invalidation ==

#[tokio::test]
async fn test_refresh_replaces_live_value() {
    let clock = ManualClock::new(0);
    let (cache, calls) = create_test_cache(10, TimeToLive::Infinite, &clock);

    assert_eq!(cache.get(key("a")).await, Ok(key("a-1")));
    assert_eq!(cache.refresh(key("a")).await, Ok(key("a-2")));
    assert_eq!(cache.get(key("a")).await, Ok(key("a-2")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalidate_all_then_reload() {
    let clock = ManualClock::new(0);
    let (cache, calls) = create_test_cache(10, TimeToLive::Infinite, &clock);

    for k in ["a", "b", "c"] {
        cache.get(key(k)).await.unwrap();
    }
    cache.invalidate_all();

    assert_eq!(cache.size(), 0);
    assert!(cache.keys().is_empty());
    assert_eq!(cache.get(key("a")).await, Ok(key("a-4")));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
