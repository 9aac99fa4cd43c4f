//! Batch receiver: assembles one cycle's work set from bounded receive calls.
//!
//! Every receive call goes through its own circuit breaker. While the queue
//! keeps failing the breaker opens and cycles skip receiving altogether
//! until the cool-down has passed.

use crate::config::BreakerConfig;
use crate::downstream::CircuitBreaker;
use crate::queue::{QueueGateway, WorkItem};
use crate::telemetry::metrics;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct BatchReceiver {
    queue: Arc<dyn QueueGateway>,
    /// Max messages asked for per call.
    receive_cap: usize,
    max_calls: usize,
    breaker: CircuitBreaker,
}

impl BatchReceiver {
    pub fn new(
        queue: Arc<dyn QueueGateway>,
        receive_cap: usize,
        max_calls: usize,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            queue,
            receive_cap,
            max_calls,
            breaker: CircuitBreaker::named("queue_receive", breaker),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Pull up to `target` messages.
    ///
    /// Stops when the target is reached, the call budget is spent, a call
    /// comes back short of the cap (queue drained), a call fails, or the
    /// receive circuit is open. A failure on the first call aborts the whole
    /// receive for this cycle; later failures count as an empty batch. Never
    /// retries within a cycle.
    pub async fn receive_batch(&self, target: usize) -> Vec<WorkItem> {
        let mut items: Vec<WorkItem> = Vec::with_capacity(target);
        let mut calls = 0;

        while items.len() < target && calls < self.max_calls {
            if self.breaker.try_acquire().is_err() {
                warn!(
                    received = items.len(),
                    "queue receive circuit open, skipping receive"
                );
                break;
            }

            calls += 1;
            let batch = match self.queue.receive(self.receive_cap).await {
                Ok(batch) => {
                    self.breaker.record_success();
                    batch
                }
                Err(e) => {
                    self.breaker.record_failure();
                    if calls == 1 {
                        warn!(error = %e, "first receive failed, queue transport may be down; skipping this cycle's receive");
                        break;
                    }
                    warn!(error = %e, call = calls, "receive failed, treating as empty batch");
                    Vec::new()
                }
            };

            let drained = batch.len() < self.receive_cap;
            items.extend(batch);
            if drained {
                break;
            }
        }

        if items.len() > target {
            // Overshoot stays hidden until its visibility timeout, then redelivers.
            debug!(over = items.len() - target, "truncating over-received messages");
            items.truncate(target);
        }

        metrics::messages_received().add(items.len() as u64, &[]);
        debug!(received = items.len(), calls, "receive complete");
        items
    }
}
