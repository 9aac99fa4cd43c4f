//! Concurrent dispatcher: fans a batch out to tasks under an admission limit
//! and waits for them up to a soft deadline.
//!
//! Tasks still running at the deadline are not cancelled. They finish in the
//! background and record into the cycle's own `CycleStats`.

use super::{CycleStats, MessageProcessor, ProcessingOutcome};
use crate::error::{Error, Result};
use crate::queue::WorkItem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time::Instant;
use tracing::{Instrument, warn};

/// What the dispatcher saw before it stopped waiting.
#[derive(Debug)]
pub struct DispatchReport {
    pub dispatched: usize,
    /// Outcomes collected before the deadline, in completion order.
    pub outcomes: Vec<ProcessingOutcome>,
    pub deadline_exceeded: bool,
}

impl DispatchReport {
    /// Messages still in flight when the dispatcher returned.
    pub fn outstanding(&self) -> usize {
        self.dispatched - self.outcomes.len()
    }
}

pub struct ConcurrentDispatcher {
    processor: Arc<MessageProcessor>,
    /// Shared across cycles, so stragglers from a timed-out cycle still count
    /// against the next cycle's admissions.
    admission: Arc<Semaphore>,
}

impl ConcurrentDispatcher {
    pub fn new(processor: Arc<MessageProcessor>, max_in_flight: usize) -> Self {
        Self {
            processor,
            admission: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Admission permits not currently held by a message.
    pub fn available_permits(&self) -> usize {
        self.admission.available_permits()
    }

    /// Spawn one task per item and wait until all of them finish, the
    /// `budget` deadline passes, or shutdown is signalled.
    ///
    /// Shutdown returns [`Error::Interrupted`]; spawned tasks keep running.
    pub async fn dispatch(
        &self,
        items: Vec<WorkItem>,
        stats: &Arc<CycleStats>,
        budget: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<DispatchReport> {
        let dispatched = items.len();
        let (tx, mut rx) = mpsc::channel(dispatched.max(1));

        for item in items {
            let processor = Arc::clone(&self.processor);
            let admission = Arc::clone(&self.admission);
            let stats = Arc::clone(stats);
            let tx = tx.clone();
            tokio::spawn(
                async move {
                    let outcome = match admission.acquire_owned().await {
                        Ok(_permit) => processor.process(item).await,
                        Err(_) => ProcessingOutcome::Critical {
                            id: item.id,
                            cause: "admission limiter closed".to_string(),
                        },
                    };
                    stats.record(&outcome);
                    // The receiver is gone once the deadline passed; stats already has it.
                    let _ = tx.send(outcome).await;
                }
                .in_current_span(),
            );
        }
        drop(tx);

        let deadline = Instant::now() + budget;
        let mut outcomes = Vec::with_capacity(dispatched);
        let deadline_exceeded = loop {
            if outcomes.len() == dispatched {
                break false;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        warn!(
                            outstanding = dispatched - outcomes.len(),
                            "shutdown while waiting for messages"
                        );
                        return Err(Error::Interrupted);
                    }
                }
                received = rx.recv() => match received {
                    Some(outcome) => outcomes.push(outcome),
                    None => break false,
                },
                _ = tokio::time::sleep_until(deadline) => break true,
            }
        };

        if deadline_exceeded {
            warn!(
                outstanding = dispatched - outcomes.len(),
                budget_ms = budget.as_millis() as u64,
                "cycle deadline exceeded, outstanding messages continue in background"
            );
        }

        Ok(DispatchReport {
            dispatched,
            outcomes,
            deadline_exceeded,
        })
    }
}
