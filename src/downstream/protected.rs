//! Timeout + circuit breaker wrapper around any downstream caller.

use super::{CircuitBreaker, DownstreamCaller, DownstreamError, RateTracker};
use crate::config::DownstreamConfig;
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ProtectedCaller<D> {
    inner: D,
    timeout: Duration,
    breaker: CircuitBreaker,
    rate: RateTracker,
}

impl<D: DownstreamCaller> ProtectedCaller<D> {
    pub fn new(inner: D, config: &DownstreamConfig) -> Self {
        Self {
            inner,
            timeout: config.timeout(),
            breaker: CircuitBreaker::new(config.breaker.clone()),
            rate: RateTracker::new(config.rate_warning_threshold),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

fn count_call(result: &'static str) {
    metrics::downstream_calls().add(1, &[KeyValue::new("result", result)]);
}

#[async_trait]
impl<D: DownstreamCaller> DownstreamCaller for ProtectedCaller<D> {
    async fn invoke(&self, payload: &str) -> Result<(), DownstreamError> {
        if let Err(e) = self.breaker.try_acquire() {
            warn!(breaker = self.breaker.name(), "circuit open, downstream call rejected");
            count_call("rejected");
            return Err(e);
        }
        self.rate.track();

        let result = match tokio::time::timeout(self.timeout, self.inner.invoke(payload)).await {
            Ok(result) => result,
            Err(_) => Err(DownstreamError::Timeout(self.timeout)),
        };

        match &result {
            Ok(()) => {
                self.breaker.record_success();
                count_call("ok");
            }
            Err(e @ DownstreamError::Timeout(_)) => {
                warn!(error = %e, "downstream call timed out");
                self.breaker.record_failure();
                count_call("timeout");
            }
            Err(e) => {
                debug!(error = %e, "downstream call failed");
                self.breaker.record_failure();
                count_call("error");
            }
        }
        result
    }
}
