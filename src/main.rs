//! TTL Cache load driver
//!
//! Runs a mixed put/get/remove workload against one shared cache and reports
//! its statistics until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttl_cache::{Config, TtlCache};

/// Operations issued between cooperative yields
const BATCH_SIZE: u64 = 256;

/// Main entry point for the load driver.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the shared cache (registers it with the sweeper)
/// 4. Spawn workload tasks and the statistics reporter
/// 5. On SIGINT/SIGTERM stop the workers and shut the sweeper down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ttl_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TTL cache load driver");

    let config = Config::from_env();
    info!(
        "Configuration loaded: ttl={}ms, max_size={:?}, cleanup_interval={}ms, workers={}, key_space={}",
        config.cache.ttl_ms,
        config.cache.max_size,
        config.cache.cleanup_interval_ms,
        config.workers,
        config.key_space
    );

    let cache: Arc<TtlCache<String, String>> = Arc::new(
        TtlCache::with_config(config.cache.clone()).context("invalid cache configuration")?,
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = JoinSet::new();

    for worker in 0..config.workers {
        tasks.spawn(run_worker(
            Arc::clone(&cache),
            worker as u64,
            config.key_space.max(1),
            stop_rx.clone(),
        ));
    }
    tasks.spawn(report_stats(
        Arc::clone(&cache),
        Duration::from_millis(config.report_interval_ms.max(1)),
        stop_rx,
    ));

    shutdown_signal().await;

    // Stop workers, then the shared sweeper
    let _ = stop_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!("Task ended abnormally: {}", err);
        }
    }
    ttl_cache::shutdown();

    let stats = cache.stats();
    info!(
        "Final stats: {}",
        serde_json::to_string(&stats).context("failed to encode stats")?
    );
    info!("Load driver shutdown complete");
    Ok(())
}

/// Issues a deterministic mix of 60% get, 30% put and 10% remove.
async fn run_worker(
    cache: Arc<TtlCache<String, String>>,
    worker: u64,
    key_space: u64,
    stop: watch::Receiver<bool>,
) {
    let mut op: u64 = 0;
    while !*stop.borrow() {
        for _ in 0..BATCH_SIZE {
            op = op.wrapping_add(1);
            let key = format!("key-{}", (op.wrapping_mul(7919) + worker) % key_space);
            match op % 10 {
                0 => {
                    cache.remove(&key);
                }
                1..=3 => {
                    cache.put(key, format!("worker-{}-op-{}", worker, op));
                }
                _ => {
                    cache.get(&key);
                }
            }
        }
        tokio::task::yield_now().await;
    }
}

/// Logs a JSON statistics snapshot every `interval` until stopped.
async fn report_stats(
    cache: Arc<TtlCache<String, String>>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = cache.stats();
                match serde_json::to_string(&stats) {
                    Ok(json) => info!(hit_rate = stats.hit_rate(), "Cache stats: {}", json),
                    Err(err) => warn!("Failed to encode stats: {}", err),
                }
            }
            _ = stop.changed() => break,
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_worker_stops_when_signalled() {
        let cache = Arc::new(TtlCache::with_max_size(Duration::from_secs(60), 50).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(run_worker(Arc::clone(&cache), 0, 100, stop_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();

        let stats = cache.stats();
        assert!(stats.insertions > 0);
        assert!(stats.hits + stats.misses > 0);
        assert!(cache.len() <= 50);
    }

    #[tokio::test]
    async fn test_reporter_stops_when_signalled() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)).unwrap());
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(report_stats(cache, Duration::from_millis(10), stop_rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        stop_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reporter should stop")
            .unwrap();
    }
}
