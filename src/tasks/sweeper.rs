//! Expiration Sweeper
//!
//! One process-wide background task that periodically removes expired
//! entries from every registered cache.
//!
//! The sweeper is started lazily by the first cache constructed. It runs on a
//! dedicated thread driving a single-threaded tokio runtime, so caches work
//! the same from synchronous and asynchronous callers. Each registration
//! carries its own period; one loop serves all of them and sleeps until the
//! earliest one is due.
//!
//! Registrations hold only a `Weak` handle. Dropping a cache deregisters it,
//! and a handle that no longer upgrades is discarded on the next cycle.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tokio::runtime::Builder;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, trace, warn};

const SWEEPER_THREAD_NAME: &str = "ttl-cache-sweeper";

static SWEEPER: OnceCell<Sweeper> = OnceCell::new();
static SHUT_DOWN: AtomicBool = AtomicBool::new(false);

// == Sweep Target ==
/// Anything the sweeper can purge.
pub(crate) trait Sweep: Send + Sync {
    /// Removes expired entries, returning how many were removed.
    fn purge_expired(&self) -> usize;
}

struct Registration {
    target: Weak<dyn Sweep>,
    interval: Duration,
    next_due: Instant,
}

type Registry = Mutex<HashMap<u64, Registration>>;

// == Sweep Handle ==
/// Keeps a cache registered with the sweeper; deregisters on drop.
#[derive(Debug)]
pub(crate) struct SweepHandle {
    id: u64,
}

impl SweepHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        unregister(self.id);
    }
}

// == Sweeper ==
struct Sweeper {
    registry: Arc<Registry>,
    wake: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    next_id: AtomicU64,
    /// False when the background thread could not be spawned
    available: bool,
}

impl Sweeper {
    fn start() -> Self {
        let registry: Arc<Registry> = Arc::new(Mutex::new(HashMap::new()));
        let wake = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let spawned = {
            let registry = Arc::clone(&registry);
            let wake = Arc::clone(&wake);
            thread::Builder::new()
                .name(SWEEPER_THREAD_NAME.to_string())
                .spawn(move || {
                    let runtime = match Builder::new_current_thread().enable_time().build() {
                        Ok(runtime) => runtime,
                        Err(err) => {
                            error!("Failed to build sweeper runtime, caches fall back to lazy expiry: {}", err);
                            return;
                        }
                    };
                    runtime.block_on(run(registry, wake, shutdown_rx));
                })
        };

        let available = match spawned {
            Ok(_) => {
                info!("Started cache sweeper thread");
                true
            }
            Err(err) => {
                error!("Failed to spawn cache sweeper, caches fall back to lazy expiry: {}", err);
                false
            }
        };

        Self {
            registry,
            wake,
            shutdown_tx,
            next_id: AtomicU64::new(1),
            available,
        }
    }

    // Idempotent
    fn stop(&self) {
        // Only the loop can observe the channel; an error means it already exited
        let _ = self.shutdown_tx.send(true);
        let dropped = {
            let mut registry = self.registry.lock();
            let dropped = registry.len();
            registry.clear();
            dropped
        };
        if dropped > 0 {
            debug!(dropped, "Dropped sweeper registrations on shutdown");
        }
    }
}

// == Register ==
/// Registers a cache to be swept every `interval`.
///
/// After `shutdown()` the handle is still returned but nothing is scheduled.
pub(crate) fn register(target: Weak<dyn Sweep>, interval: Duration) -> SweepHandle {
    // Id 0 is never scheduled
    if SHUT_DOWN.load(Ordering::Acquire) {
        debug!("Sweeper shut down, cache relies on lazy expiry");
        return SweepHandle { id: 0 };
    }

    let sweeper = SWEEPER.get_or_init(Sweeper::start);
    let id = sweeper.next_id.fetch_add(1, Ordering::Relaxed);

    if !sweeper.available {
        debug!(id, "Sweeper not running, cache relies on lazy expiry");
        return SweepHandle { id };
    }

    sweeper.registry.lock().insert(
        id,
        Registration {
            target,
            interval,
            next_due: Instant::now() + interval,
        },
    );
    sweeper.wake.notify_one();

    // A shutdown racing this registration must not leave it scheduled
    if SHUT_DOWN.load(Ordering::Acquire) {
        sweeper.stop();
    }

    debug!(
        id,
        interval_ms = interval.as_millis() as u64,
        "Registered cache with sweeper"
    );
    SweepHandle { id }
}

// == Unregister ==
/// Removes a registration; unknown ids are ignored.
pub(crate) fn unregister(id: u64) {
    if let Some(sweeper) = SWEEPER.get() {
        if sweeper.registry.lock().remove(&id).is_some() {
            debug!(id, "Unregistered cache from sweeper");
        }
    }
}

// == Shutdown ==
/// Permanently stops the shared sweeper for every cache in the process.
///
/// Irreversible and meant for process teardown. Caches stay usable
/// afterwards: expired entries are still dropped lazily when read, they are
/// just no longer purged in the background.
pub fn shutdown() {
    if SHUT_DOWN.swap(true, Ordering::AcqRel) {
        return;
    }
    if let Some(sweeper) = SWEEPER.get() {
        sweeper.stop();
    }
    info!("Cache sweeper shut down");
}

/// True once `shutdown()` has been called.
pub fn is_shut_down() -> bool {
    SHUT_DOWN.load(Ordering::Acquire)
}

/// Number of caches currently scheduled for sweeping.
pub fn registered_caches() -> usize {
    SWEEPER
        .get()
        .map_or(0, |sweeper| sweeper.registry.lock().len())
}

#[cfg(test)]
pub(crate) fn is_registered(id: u64) -> bool {
    SWEEPER
        .get()
        .is_some_and(|sweeper| sweeper.registry.lock().contains_key(&id))
}

// == Sweep Loop ==
async fn run(registry: Arc<Registry>, wake: Arc<Notify>, mut shutdown_rx: watch::Receiver<bool>) {
    debug!("Sweep loop running");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next_due = sweep_due(&registry, Instant::now());
        let sleep = async {
            match next_due {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = sleep => {}
            _ = wake.notified() => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    debug!("Sweep loop stopped");
}

/// Sweeps every due registration once and returns when the next one is due.
fn sweep_due(registry: &Registry, now: Instant) -> Option<Instant> {
    let mut due = Vec::new();
    let next_due = {
        let mut registry = registry.lock();
        registry.retain(|id, registration| {
            if registration.next_due > now {
                return true;
            }
            match registration.target.upgrade() {
                Some(target) => {
                    due.push((*id, target));
                    registration.next_due = now + registration.interval;
                    true
                }
                None => {
                    debug!(id, "Cache dropped, removing sweeper registration");
                    false
                }
            }
        });
        registry.values().map(|registration| registration.next_due).min()
    };

    // Registry lock released: a panicking or slow cache cannot stall the others
    for (id, target) in due {
        match panic::catch_unwind(AssertUnwindSafe(|| target.purge_expired())) {
            Ok(0) => trace!(id, "Sweep found no expired entries"),
            Ok(removed) => debug!(id, removed, "Swept expired entries"),
            Err(_) => warn!(id, "Sweep panicked, retrying next cycle"),
        }
    }

    next_due
}
