//! Periodic job driver
//!
//! Each `PeriodicTask` owns one timer. A tick that arrives while the
//! previous run is still in flight is dropped rather than queued, so a slow
//! cycle never piles up work behind it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// At most one holder of a `RunPermit` at a time
#[derive(Debug, Default)]
pub struct TickGuard {
    running: AtomicBool,
}

impl TickGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the permit unless a run is already in flight
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                guard: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Released when dropped, including when the run panics
#[derive(Debug)]
pub struct RunPermit {
    guard: Arc<TickGuard>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// Counters for one timer's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicStats {
    /// Runs started
    pub runs: u64,
    /// Ticks dropped because a run was in flight
    pub dropped: u64,
}

/// A named job run on a fixed interval until shutdown
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    name: String,
    interval: Duration,
}

impl PeriodicTask {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drive `job` until `shutdown` flips to true, then wait for the run in flight
    pub async fn run<F, Fut>(&self, job: F, mut shutdown: watch::Receiver<bool>) -> PeriodicStats
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        info!(
            task = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "Starting periodic task"
        );

        let guard = Arc::new(TickGuard::new());
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = PeriodicStats::default();
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(permit) = guard.try_acquire() else {
                        stats.dropped += 1;
                        debug!(task = %self.name, "Previous run still in flight, dropping tick");
                        continue;
                    };

                    stats.runs += 1;
                    let run = job();
                    in_flight = Some(tokio::spawn(async move {
                        let _permit = permit;
                        run.await;
                    }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = in_flight {
            if let Err(e) = handle.await {
                warn!(task = %self.name, error = %e, "Periodic run panicked");
            }
        }

        info!(
            task = %self.name,
            runs = stats.runs,
            dropped = stats.dropped,
            "Stopped periodic task"
        );
        stats
    }
}
