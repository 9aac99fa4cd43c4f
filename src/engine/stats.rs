//! Per-cycle statistics.
//!
//! Each cycle owns a fresh `CycleStats` behind an `Arc`. Messages still in
//! flight after the cycle's deadline keep their handle and record into the
//! cycle they came from, never into the next one's counters.

use super::ProcessingOutcome;
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct CycleStats {
    cycle_id: Uuid,
    started: Instant,
    started_at: DateTime<Utc>,
    total_received: AtomicUsize,
    processed: AtomicUsize,
    failed: AtomicUsize,
    rescheduled: AtomicUsize,
    abandoned: AtomicUsize,
    critical: AtomicUsize,
    /// Set once the summary has been taken; later records are late arrivals.
    sealed: AtomicBool,
}

impl CycleStats {
    /// Fresh counters for a new cycle.
    pub fn start() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started: Instant::now(),
            started_at: Utc::now(),
            total_received: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            rescheduled: AtomicUsize::new(0),
            abandoned: AtomicUsize::new(0),
            critical: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
        }
    }

    pub fn cycle_id(&self) -> Uuid {
        self.cycle_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn set_total_received(&self, total: usize) {
        self.total_received.store(total, Ordering::Relaxed);
    }

    pub fn total_received(&self) -> usize {
        self.total_received.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Received messages with no outcome yet.
    pub fn outstanding(&self) -> usize {
        self.total_received()
            .saturating_sub(self.processed() + self.failed())
    }

    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an outcome. Safe to call from any number of tasks at once.
    pub fn record(&self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Success { .. } => self.record_success(),
            ProcessingOutcome::Rescheduled { .. } => {
                self.rescheduled.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
            }
            ProcessingOutcome::AbandonedMaxRetries { .. } => {
                self.abandoned.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
            }
            ProcessingOutcome::Critical { .. } => {
                self.critical.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
            }
        }
        metrics::message_outcomes().add(1, &[KeyValue::new("outcome", outcome.label())]);

        if self.sealed.load(Ordering::Acquire) {
            let outstanding = self.outstanding();
            info!(
                cycle_id = %self.cycle_id,
                id = %outcome.id(),
                outcome = outcome.label(),
                outstanding,
                "late outcome recorded after cycle deadline"
            );
            if outstanding == 0 {
                self.summary(self.elapsed()).log_settled();
            }
        }
    }

    /// Mark the cycle's bookkeeping phase as over.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn summary(&self, elapsed: Duration) -> CycleSummary {
        CycleSummary {
            cycle_id: self.cycle_id,
            started_at: self.started_at,
            total_received: self.total_received(),
            processed: self.processed(),
            failed: self.failed(),
            rescheduled: self.rescheduled.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            critical: self.critical.load(Ordering::Relaxed),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Point-in-time view of a cycle's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub cycle_id: Uuid,
    /// Wall-clock time the cycle began.
    pub started_at: DateTime<Utc>,
    pub total_received: usize,
    pub processed: usize,
    pub failed: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
    pub critical: usize,
    pub elapsed_ms: u64,
}

impl CycleSummary {
    /// Processed messages per second; 0 for a zero-length cycle.
    pub fn throughput(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return 0.0;
        }
        self.processed as f64 / (self.elapsed_ms as f64 / 1000.0)
    }

    pub fn outstanding(&self) -> usize {
        self.total_received
            .saturating_sub(self.processed + self.failed)
    }

    /// Emit the summary line: `warn` if anything failed, `info` otherwise.
    pub fn log(&self) {
        if self.failed > 0 {
            warn!(
                cycle_id = %self.cycle_id,
                started_at = %self.started_at,
                rescheduled = self.rescheduled,
                abandoned = self.abandoned,
                critical = self.critical,
                outstanding = self.outstanding(),
                "{}",
                self
            );
        } else {
            info!(
                cycle_id = %self.cycle_id,
                started_at = %self.started_at,
                outstanding = self.outstanding(),
                "{}",
                self
            );
        }
    }

    fn log_settled(&self) {
        info!(
            cycle_id = %self.cycle_id,
            processed = self.processed,
            failed = self.failed,
            "all late outcomes settled for cycle"
        );
    }
}

impl std::fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CYCLE SUMMARY - Total: {} | Processed: {} | Failed: {} | Time: {}ms | TPS: {:.2}",
            self.total_received,
            self.processed,
            self.failed,
            self.elapsed_ms,
            self.throughput()
        )
    }
}
