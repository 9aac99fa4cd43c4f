//! Fixed-period cycle scheduler with a non-overlap guarantee.
//!
//! A trigger that fires while a cycle is still running is skipped, not
//! queued. Under sustained overload the effective polling rate drops instead
//! of concurrency growing without bound.

use super::Cycle;
use crate::error::Error;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What a trigger did.
#[derive(Debug)]
pub enum Trigger {
    /// A new cycle is running on the returned task.
    Started(JoinHandle<()>),
    /// The previous cycle was still running.
    Skipped { running_for: Duration },
    /// The previous cycle finished early and its period has not elapsed yet.
    Paused { remaining: Duration },
}

#[derive(Default)]
struct Timing {
    running_since: Option<Instant>,
    /// Earliest instant the next cycle may start.
    not_before: Option<Instant>,
}

#[derive(Default)]
struct Gate {
    busy: AtomicBool,
    timing: Mutex<Timing>,
}

impl Gate {
    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the busy flag however the cycle task ends: return, error,
/// cancellation or panic.
struct BusyGuard(Arc<Gate>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.timing().running_since = None;
        self.0.busy.store(false, Ordering::Release);
    }
}

fn count_cycle(result: &'static str) {
    metrics::cycles().add(1, &[KeyValue::new("result", result)]);
}

pub struct CycleScheduler {
    cycle: Arc<Cycle>,
    gate: Arc<Gate>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Clone for CycleScheduler {
    fn clone(&self) -> Self {
        Self {
            cycle: Arc::clone(&self.cycle),
            gate: Arc::clone(&self.gate),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl CycleScheduler {
    pub fn new(cycle: Cycle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            cycle: Arc::new(cycle),
            gate: Arc::new(Gate::default()),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Is a cycle body running right now?
    pub fn is_running(&self) -> bool {
        self.gate.busy.load(Ordering::Acquire)
    }

    /// Admission permits free in the dispatcher.
    pub fn available_admission(&self) -> usize {
        self.cycle.dispatcher().available_permits()
    }

    /// Stop triggering and interrupt the active cycle's wait phase.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Fire a trigger now.
    pub fn trigger(&self) -> Trigger {
        self.trigger_at(Instant::now())
    }

    /// Fire a trigger that was scheduled for `scheduled`.
    pub fn trigger_at(&self, scheduled: Instant) -> Trigger {
        let not_before = self.gate.timing().not_before;
        if let Some(remaining) = not_before.and_then(|nb| nb.checked_duration_since(scheduled)) {
            if !remaining.is_zero() {
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "cycle period not yet elapsed, deferring trigger"
                );
                return Trigger::Paused { remaining };
            }
        }

        if self
            .gate
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let running_for = self
                .gate
                .timing()
                .running_since
                .map(|since| since.elapsed())
                .unwrap_or_default();
            warn!(
                running_for_ms = running_for.as_millis() as u64,
                "previous cycle still running, skipping this trigger"
            );
            count_cycle("skipped");
            return Trigger::Skipped { running_for };
        }

        let guard = BusyGuard(Arc::clone(&self.gate));
        {
            let mut timing = self.gate.timing();
            timing.running_since = Some(Instant::now());
            timing.not_before = None;
        }
        count_cycle("started");

        let cycle = Arc::clone(&self.cycle);
        let gate = Arc::clone(&self.gate);
        let shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            match cycle.run_at(scheduled, shutdown).await {
                Ok(_) => {}
                Err(Error::Interrupted) => {
                    warn!("cycle interrupted");
                    count_cycle("interrupted");
                }
                Err(e) => {
                    error!(error = %e, "cycle failed");
                    count_cycle("failed");
                }
            }

            let period = cycle.period();
            if scheduled.elapsed() < period {
                gate.timing().not_before = Some(scheduled + period);
            }
        });

        Trigger::Started(handle)
    }

    /// Trigger a cycle every period until shutdown, then wait for the active
    /// cycle to exit.
    pub async fn run(&self) {
        let period = self.cycle.period();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.subscribe();
        let mut active: Option<JoinHandle<()>> = None;

        info!(period_ms = period.as_millis() as u64, "cycle scheduler started");

        while !*shutdown.borrow_and_update() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                tick = ticker.tick() => {
                    if let Trigger::Started(handle) = self.trigger_at(tick) {
                        active = Some(handle);
                    }
                }
            }
        }

        info!("cycle scheduler shutting down");
        if let Some(handle) = active {
            if let Err(e) = handle.await {
                error!(error = %e, "cycle task did not exit cleanly");
            }
        }
    }
}
