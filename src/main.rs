//! Effect Cache - demo driver
//!
//! Runs a burst of concurrent requests against a cache backed by a slow
//! simulated lookup, then reports the cache statistics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use effect_cache::{spawn_cleanup_task, Cache, Config};
use futures::future::join_all;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Number of concurrent requests issued per round
const REQUESTS_PER_ROUND: usize = 64;

/// Number of distinct keys requested
const DISTINCT_KEYS: usize = 8;

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache over a simulated slow lookup
/// 4. Start background TTL cleanup task
/// 5. Issue concurrent requests, stopping early on Ctrl+C
/// 6. Log the resulting statistics as JSON
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "effect_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Effect Cache demo");

    let config = Config::try_from_env().context("Failed to load configuration")?;
    info!(
        "Configuration loaded: capacity={}, time_to_live={:?}, cleanup_interval={:?}",
        config.capacity, config.time_to_live, config.cleanup_interval
    );

    let lookups = Arc::new(AtomicUsize::new(0));
    let counter = lookups.clone();
    let cache: Cache<usize, String, String> =
        Cache::make(config.capacity, config.time_to_live, move |key: usize| {
            counter.fetch_add(1, Ordering::Relaxed);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(format!("value-{key}"))
            }
        });

    let cleanup_handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);
    info!("Background cleanup task started");

    tokio::select! {
        _ = run_rounds(&cache) => {}
        _ = shutdown_signal() => {
            warn!("Interrupted before all rounds completed");
        }
    }

    cleanup_handle.abort();

    let stats = cache.stats();
    info!(
        lookups = lookups.load(Ordering::Relaxed),
        hit_rate = stats.hit_rate(),
        "Demo finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

/// Issues three rounds of concurrent requests over overlapping keys.
async fn run_rounds(cache: &Cache<usize, String, String>) {
    for round in 1..=3 {
        let requests = (0..REQUESTS_PER_ROUND).map(|i| cache.get(i % DISTINCT_KEYS));
        let results = join_all(requests).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        let interrupted = results
            .iter()
            .filter(|r| r.as_ref().is_err_and(|err| err.is_interrupted()))
            .count();
        info!(round, size = cache.size(), failures, interrupted, "Round complete");
    }

    if let Some(key) = cache.keys().first().copied() {
        if let Ok(value) = cache.refresh(key).await {
            info!(key, value = %value, "Refreshed oldest key");
        }
    }
}

/// Waits for Ctrl+C.
async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, initiating shutdown...");
}
