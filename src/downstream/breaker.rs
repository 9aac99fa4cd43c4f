//! Circuit breaker guarding a remote call: the downstream service, or the
//! queue's receive.
//!
//! States:
//! - Closed: calls pass through; outcomes fill a rolling window
//! - Open: calls are rejected until the cool-down delay has passed
//! - Half-Open: trial calls go through; enough successes close the circuit,
//!   any failure reopens it

use crate::config::BreakerConfig;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use super::DownstreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

struct Inner {
    state: CircuitState,
    /// Last `request_volume_threshold` outcomes while closed; `true` = failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

pub struct CircuitBreaker {
    /// Which call this breaker guards, for logs and metrics.
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Breaker for the downstream call.
    pub fn new(config: BreakerConfig) -> Self {
        Self::named("downstream", config)
    }

    pub fn named(name: &'static str, config: BreakerConfig) -> Self {
        let window = VecDeque::with_capacity(config.request_volume_threshold);
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_successes: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admit a call, or reject it with [`DownstreamError::CircuitOpen`].
    ///
    /// An open circuit whose delay has elapsed moves to half-open and admits
    /// the call as a trial.
    pub fn try_acquire(&self) -> Result<(), DownstreamError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.delay());
                if cooled {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_successes = 0;
                    Ok(())
                } else {
                    Err(DownstreamError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => self.push_outcome(&mut inner, false),
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.window.clear();
                    inner.opened_at = None;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            // Late result from a call admitted before the circuit opened.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                self.push_outcome(&mut inner, true);
                if self.ratio_exceeded(&inner) {
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => self.open(&mut inner),
            CircuitState::Open => {}
        }
    }

    fn push_outcome(&self, inner: &mut Inner, failed: bool) {
        if inner.window.len() == self.config.request_volume_threshold {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);
    }

    fn ratio_exceeded(&self, inner: &Inner) -> bool {
        if inner.window.len() < self.config.request_volume_threshold {
            return false;
        }
        let failures = inner.window.iter().filter(|f| **f).count();
        failures as f64 / inner.window.len() as f64 >= self.config.failure_ratio
    }

    fn open(&self, inner: &mut Inner) {
        inner.opened_at = Some(Instant::now());
        inner.half_open_successes = 0;
        inner.window.clear();
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        metrics::circuit_transitions().add(
            1,
            &[
                KeyValue::new("breaker", self.name),
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
        match to {
            CircuitState::Open => warn!(
                breaker = self.name,
                %from,
                delay_ms = self.config.delay_ms,
                "circuit opened"
            ),
            _ => info!(breaker = self.name, %from, %to, "circuit transition"),
        }
    }
}
