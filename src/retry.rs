use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::store::{SeriesStore, WriteRequest};

// ─── Coordinator ─────────────────────────────────────────────────

/// Owns every unprocessed set handed back by a batch submission and
/// retries it in the background until the backend accepts it or the
/// elapsed-time budget runs out.
///
/// Units are fire-and-forget from the write path's point of view, but
/// not ungoverned: a semaphore caps how many retry loops run at once
/// (later units queue inside their own task, never blocking the
/// caller), a `TaskTracker` knows about every in-flight unit, and a
/// `CancellationToken` stops them all at shutdown.
pub struct RetryCoordinator<S> {
    store: Arc<S>,
    policy: RetryPolicy,
    units: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    stats: RetryStats,
}

impl<S: SeriesStore> RetryCoordinator<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self {
            store,
            units: Arc::new(Semaphore::new(policy.max_units)),
            policy,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            stats: RetryStats::default(),
        }
    }

    /// Take ownership of one unprocessed set and retry it in the
    /// background. Returns immediately; an empty set is a no-op.
    pub fn spawn(&self, unprocessed: Vec<WriteRequest>) {
        if unprocessed.is_empty() {
            return;
        }

        let unit = Uuid::new_v4();
        self.stats.unit_spawned();
        debug!(%unit, items = unprocessed.len(), "retry unit spawned");

        let store = Arc::clone(&self.store);
        let policy = self.policy.clone();
        let units = Arc::clone(&self.units);
        let cancel = self.cancel.clone();
        let stats = self.stats.clone();

        self.tracker.spawn(async move {
            // Concurrency cap: waiting here delays this unit only, the
            // write path has already returned.
            let _permit = tokio::select! {
                _ = cancel.cancelled() => {
                    stats.unit_cancelled(unprocessed.len());
                    return;
                }
                permit = units.acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => return,
                },
            };

            run_unit(unit, store, policy, cancel, stats, unprocessed).await;
        });
    }

    /// Current counters, for diagnostics.
    pub fn stats(&self) -> RetrySnapshot {
        self.stats.snapshot()
    }

    /// Wait for all in-flight units to run to completion (success or
    /// budget exhaustion) without interrupting them.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop all in-flight units now and wait for them to exit. Items
    /// still pending in a cancelled unit are dropped and counted.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let snapshot = self.stats.snapshot();
        if snapshot.items_dropped > 0 {
            warn!(
                items_dropped = snapshot.items_dropped,
                "retry coordinator stopped with undelivered items"
            );
        } else {
            info!("retry coordinator stopped");
        }
    }
}

// ─── Retry loop ──────────────────────────────────────────────────

async fn run_unit<S: SeriesStore>(
    unit: Uuid,
    store: Arc<S>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    stats: RetryStats,
    mut pending: Vec<WriteRequest>,
) {
    let started = Instant::now();
    let mut delay = policy.base_backoff();
    let mut attempt = 0u32;

    loop {
        let wait = jittered(delay);

        // Budget check happens before the sleep, so no attempt ever
        // starts past the elapsed-time cap.
        if started.elapsed() + wait > policy.max_elapsed() {
            error!(
                %unit,
                attempts = attempt,
                items = pending.len(),
                elapsed_secs = started.elapsed().as_secs(),
                "retry budget exhausted, dropping items"
            );
            stats.unit_exhausted(pending.len());
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%unit, items = pending.len(), "retry unit cancelled");
                stats.unit_cancelled(pending.len());
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        attempt += 1;
        stats.attempt();

        match store.batch_put(&pending).await {
            Ok(unprocessed) if unprocessed.is_empty() => {
                debug!(%unit, attempts = attempt, items = pending.len(), "retry unit recovered");
                stats.unit_recovered(pending.len());
                return;
            }
            // The set stays one unit: whatever the backend took is done,
            // the remainder carries on under the same budget.
            Ok(unprocessed) => {
                let accepted = pending.len().saturating_sub(unprocessed.len());
                if accepted > 0 {
                    debug!(%unit, attempt, accepted, remaining = unprocessed.len(), "retry partially accepted");
                    stats.items_recovered(accepted);
                }
                pending = unprocessed;
            }
            Err(e) => {
                warn!(%unit, attempt, error = %e, "retry attempt failed");
            }
        }

        delay = delay.saturating_mul(2);
    }
}

/// Equal jitter: half the nominal delay fixed, half uniform random.
fn jittered(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    if millis < 2 {
        return delay;
    }
    let half = millis / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}

// ─── Stats ───────────────────────────────────────────────────────

/// Shared counters: the retry loops record, diagnostics snapshot.
#[derive(Clone, Default)]
pub struct RetryStats {
    inner: Arc<Mutex<StatsInner>>,
}

#[derive(Default)]
struct StatsInner {
    units_spawned: u64,
    units_in_flight: u64,
    units_recovered: u64,
    units_exhausted: u64,
    units_cancelled: u64,
    attempts: u64,
    items_recovered: u64,
    items_dropped: u64,
}

/// Point-in-time copy of the retry counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RetrySnapshot {
    pub units_spawned: u64,
    pub units_in_flight: u64,
    pub units_recovered: u64,
    pub units_exhausted: u64,
    pub units_cancelled: u64,
    pub attempts: u64,
    pub items_recovered: u64,
    pub items_dropped: u64,
}

impl RetryStats {
    fn unit_spawned(&self) {
        let mut s = self.inner.lock();
        s.units_spawned += 1;
        s.units_in_flight += 1;
    }

    fn attempt(&self) {
        self.inner.lock().attempts += 1;
    }

    fn items_recovered(&self, items: usize) {
        self.inner.lock().items_recovered += items as u64;
    }

    fn unit_recovered(&self, items: usize) {
        let mut s = self.inner.lock();
        s.units_in_flight -= 1;
        s.units_recovered += 1;
        s.items_recovered += items as u64;
    }

    fn unit_exhausted(&self, items: usize) {
        let mut s = self.inner.lock();
        s.units_in_flight -= 1;
        s.units_exhausted += 1;
        s.items_dropped += items as u64;
    }

    fn unit_cancelled(&self, items: usize) {
        let mut s = self.inner.lock();
        s.units_in_flight -= 1;
        s.units_cancelled += 1;
        s.items_dropped += items as u64;
    }

    pub fn snapshot(&self) -> RetrySnapshot {
        let s = self.inner.lock();
        RetrySnapshot {
            units_spawned: s.units_spawned,
            units_in_flight: s.units_in_flight,
            units_recovered: s.units_recovered,
            units_exhausted: s.units_exhausted,
            units_cancelled: s.units_cancelled,
            attempts: s.attempts,
            items_recovered: s.items_recovered,
            items_dropped: s.items_dropped,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
