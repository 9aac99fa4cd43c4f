//! One cycle body: receive a batch, dispatch it, report.

use super::{
    BatchReceiver, ConcurrentDispatcher, CycleStats, CycleSummary, MessageProcessor, RetryPolicy,
};
use crate::config::ConsumerConfig;
use crate::downstream::DownstreamCaller;
use crate::error::{Error, Result};
use crate::queue::QueueGateway;
use crate::telemetry::cycle::start_cycle_span;
use crate::telemetry::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument, debug, info};

/// Result of a cycle whose wait phase completed.
#[derive(Debug)]
pub struct CycleReport {
    pub summary: CycleSummary,
    pub deadline_exceeded: bool,
    /// Per-cycle counters, still live for messages that outran the deadline.
    pub stats: Arc<CycleStats>,
}

pub struct Cycle {
    receiver: BatchReceiver,
    dispatcher: ConcurrentDispatcher,
    batch_size: usize,
    period: Duration,
    /// How long after its trigger a cycle may wait for its messages.
    budget: Duration,
}

impl Cycle {
    /// Wire a cycle from its two collaborators.
    pub fn new(
        queue: Arc<dyn QueueGateway>,
        downstream: Arc<dyn DownstreamCaller>,
        config: &ConsumerConfig,
    ) -> Self {
        let processor = Arc::new(MessageProcessor::new(
            Arc::clone(&queue),
            downstream,
            RetryPolicy::from_config(config),
        ));
        Self {
            receiver: BatchReceiver::new(
                queue,
                config.receive_cap,
                config.max_receive_calls,
                config.receive.breaker.clone(),
            ),
            dispatcher: ConcurrentDispatcher::new(processor, config.batch_size),
            batch_size: config.batch_size,
            period: config.cycle_period(),
            budget: config.cycle_budget(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn dispatcher(&self) -> &ConcurrentDispatcher {
        &self.dispatcher
    }

    /// Run one cycle triggered now.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<CycleReport> {
        self.run_at(Instant::now(), shutdown).await
    }

    /// Run one cycle whose trigger fired at `triggered`. The wait phase ends
    /// at `triggered + budget`, ahead of the next trigger.
    ///
    /// Per-message failures never fail the cycle; only a shutdown during the
    /// wait phase does.
    pub async fn run_at(
        &self,
        triggered: Instant,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport> {
        if *shutdown.borrow_and_update() {
            return Err(Error::Interrupted);
        }

        let stats = Arc::new(CycleStats::start());
        let span = start_cycle_span(&stats.cycle_id());

        async {
            let items = self.receiver.receive_batch(self.batch_size).await;
            stats.set_total_received(items.len());
            span.record("cycle.received", items.len());

            let mut deadline_exceeded = false;
            if items.is_empty() {
                debug!("no messages to process this cycle");
            } else {
                info!(received = items.len(), "received messages for processing");
                let budget = (triggered + self.budget).saturating_duration_since(Instant::now());
                let report = self
                    .dispatcher
                    .dispatch(items, &stats, budget, &mut shutdown)
                    .await?;
                deadline_exceeded = report.deadline_exceeded;
            }

            let elapsed = stats.elapsed();
            stats.seal();
            let summary = stats.summary(elapsed);
            if summary.total_received > 0 {
                summary.log();
            } else {
                debug!("{}", summary);
            }
            metrics::cycle_duration_ms().record(elapsed.as_secs_f64() * 1000.0, &[]);

            Ok(CycleReport {
                summary,
                deadline_exceeded,
                stats: Arc::clone(&stats),
            })
        }
        .instrument(span.clone())
        .await
    }
}
