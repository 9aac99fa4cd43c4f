//! Retry policy: redelivery count → reschedule with backoff, or abandon.

use crate::config::ConsumerConfig;
use crate::downstream::DownstreamError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hide the message for `delay`, then let the queue redeliver it.
    Reschedule { delay: Duration },
    /// Stop retrying; leave the message to the queue's dead-letter policy.
    Abandon { cause: String },
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &ConsumerConfig) -> Self {
        Self::new(config.max_retries, config.base_delay())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff is keyed on the attempt number, not elapsed time:
    /// `base_delay * 2^redelivery_count`, saturating on overflow.
    pub fn delay_for(&self, redelivery_count: u32) -> Duration {
        2u32.checked_pow(redelivery_count)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Decide what to do with a message whose downstream call failed.
    ///
    /// A message may be received `max_retries` times and still be
    /// rescheduled; the receive after that abandons it.
    pub fn decide(&self, redelivery_count: u32, error: &DownstreamError) -> RetryDecision {
        if redelivery_count > self.max_retries {
            RetryDecision::Abandon {
                cause: format!(
                    "exhausted {redelivery_count}/{} deliveries: {error}",
                    self.max_retries
                ),
            }
        } else {
            RetryDecision::Reschedule {
                delay: self.delay_for(redelivery_count),
            }
        }
    }
}
