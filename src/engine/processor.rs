//! Per-message state machine: call downstream, then acknowledge or retry.
//!
//! received → calling → {acknowledged | retry_decided} → terminal

use super::ProcessingOutcome;
use super::retry::{RetryDecision, RetryPolicy};
use crate::downstream::{DownstreamCaller, DownstreamError};
use crate::queue::{QueueGateway, WorkItem};
use crate::telemetry::cycle::{record_state_transition, start_message_span};
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

pub struct MessageProcessor {
    queue: Arc<dyn QueueGateway>,
    downstream: Arc<dyn DownstreamCaller>,
    policy: RetryPolicy,
}

impl MessageProcessor {
    pub fn new(
        queue: Arc<dyn QueueGateway>,
        downstream: Arc<dyn DownstreamCaller>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue,
            downstream,
            policy,
        }
    }

    /// Drive one message to a terminal outcome. Never fails: every error is
    /// folded into the returned outcome.
    pub async fn process(&self, item: WorkItem) -> ProcessingOutcome {
        let span = start_message_span(&item.id, item.redelivery_count);
        let outcome = async {
            record_state_transition(&span, "received", "calling");
            match self.downstream.invoke(&item.body).await {
                Ok(()) => {
                    record_state_transition(&span, "calling", "acknowledged");
                    self.acknowledge(item).await
                }
                Err(e) => {
                    record_state_transition(&span, "calling", "retry_decided");
                    self.handle_failure(item, e).await
                }
            }
        }
        .instrument(span.clone())
        .await;

        span.record("message.outcome", outcome.label());
        outcome
    }

    async fn acknowledge(&self, item: WorkItem) -> ProcessingOutcome {
        let WorkItem { id, ack_token, .. } = item;
        // The message is done even if the ack is lost; redelivery is the backstop.
        if let Err(e) = self.queue.acknowledge(ack_token).await {
            warn!(id = %id, error = %e, "acknowledge failed, message may be redelivered");
        } else {
            debug!(id = %id, "message processed");
        }
        ProcessingOutcome::Success { id }
    }

    async fn handle_failure(&self, item: WorkItem, err: DownstreamError) -> ProcessingOutcome {
        let WorkItem {
            id,
            redelivery_count,
            ack_token,
            ..
        } = item;

        match self.policy.decide(redelivery_count, &err) {
            RetryDecision::Abandon { cause } => {
                warn!(
                    id = %id,
                    attempt = redelivery_count,
                    max_retries = self.policy.max_retries(),
                    error = %err,
                    "max retries reached, leaving message to the dead-letter policy"
                );
                ProcessingOutcome::AbandonedMaxRetries { id, cause }
            }
            RetryDecision::Reschedule { delay } => {
                match self.queue.extend_invisibility(ack_token, delay).await {
                    Ok(()) => {
                        info!(
                            id = %id,
                            attempt = redelivery_count,
                            max_retries = self.policy.max_retries(),
                            delay_secs = delay.as_secs(),
                            error = %err,
                            "message rescheduled"
                        );
                        ProcessingOutcome::Rescheduled {
                            id,
                            attempt: redelivery_count,
                            next_visibility_delay: delay,
                        }
                    }
                    Err(e) => {
                        error!(
                            id = %id,
                            attempt = redelivery_count,
                            error = %e,
                            downstream_error = %err,
                            "failed to reschedule message"
                        );
                        ProcessingOutcome::Critical {
                            id,
                            cause: format!("reschedule failed: {e} (after downstream error: {err})"),
                        }
                    }
                }
            }
        }
    }
}
