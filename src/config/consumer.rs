//! Consumer tuning: batch sizes, cycle cadence, retry, receive and downstream knobs.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! the stock configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Target number of messages pulled per cycle. Also sizes the admission limiter.
    pub batch_size: usize,
    /// Max messages asked for in a single receive call.
    pub receive_cap: usize,
    /// Max receive calls per cycle.
    pub max_receive_calls: usize,
    pub cycle_period_ms: u64,
    /// A cycle stops waiting this long before its period ends, so the next
    /// trigger finds the scheduler idle.
    pub deadline_margin_ms: u64,
    /// Redeliveries allowed before a message is abandoned to the dead-letter policy.
    pub max_retries: u32,
    /// Backoff base; the reschedule delay is `base * 2^redelivery_count`.
    pub base_delay_secs: u64,
    /// Invisibility applied to messages as they are received.
    pub visibility_timeout_secs: u64,
    pub receive: ReceiveConfig,
    pub downstream: DownstreamConfig,
}

/// Guards the queue's receive calls, so an unreachable queue is not polled
/// every period.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    #[serde(deserialize_with = "receive_breaker")]
    pub breaker: BreakerConfig,
}

/// Keys given in a `[receive.breaker]` table. Missing keys fall back to the
/// receive defaults, not the downstream ones.
#[derive(Deserialize)]
struct BreakerOverrides {
    request_volume_threshold: Option<usize>,
    failure_ratio: Option<f64>,
    delay_ms: Option<u64>,
    success_threshold: Option<u32>,
}

fn receive_breaker<'de, D>(deserializer: D) -> std::result::Result<BreakerConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let o = BreakerOverrides::deserialize(deserializer)?;
    let base = ReceiveConfig::default().breaker;
    Ok(BreakerConfig {
        request_volume_threshold: o
            .request_volume_threshold
            .unwrap_or(base.request_volume_threshold),
        failure_ratio: o.failure_ratio.unwrap_or(base.failure_ratio),
        delay_ms: o.delay_ms.unwrap_or(base.delay_ms),
        success_threshold: o.success_threshold.unwrap_or(base.success_threshold),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    pub timeout_ms: u64,
    /// Calls per second above which a rate warning is logged.
    pub rate_warning_threshold: u32,
    pub breaker: BreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Size of the rolling window of outcomes the failure ratio is computed over.
    pub request_volume_threshold: usize,
    pub failure_ratio: f64,
    /// How long the circuit stays open before a half-open trial call is allowed.
    pub delay_ms: u64,
    /// Consecutive half-open successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            receive_cap: 10,
            max_receive_calls: 10,
            cycle_period_ms: 1000,
            deadline_margin_ms: 50,
            max_retries: 3,
            base_delay_secs: 10,
            visibility_timeout_secs: 30,
            receive: ReceiveConfig::default(),
            downstream: DownstreamConfig::default(),
        }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            breaker: BreakerConfig {
                request_volume_threshold: 5,
                failure_ratio: 0.6,
                delay_ms: 30_000,
                success_threshold: 3,
            },
        }
    }
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            rate_warning_threshold: 95,
            breaker: BreakerConfig::default(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            request_volume_threshold: 10,
            failure_ratio: 0.3,
            delay_ms: 10_000,
            success_threshold: 1,
        }
    }
}

impl ConsumerConfig {
    /// Load overrides from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read consumer config {}: {e}", path.display()))
        })?;
        let config: ConsumerConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("bad consumer config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size as u64),
            ("receive_cap", self.receive_cap as u64),
            ("max_receive_calls", self.max_receive_calls as u64),
            ("cycle_period_ms", self.cycle_period_ms),
            ("downstream.timeout_ms", self.downstream.timeout_ms),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.deadline_margin_ms >= self.cycle_period_ms {
            return Err(Error::Config(format!(
                "deadline_margin_ms ({}) must be less than cycle_period_ms ({})",
                self.deadline_margin_ms, self.cycle_period_ms
            )));
        }

        self.receive.breaker.validate("receive.breaker")?;
        self.downstream.breaker.validate("downstream.breaker")
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    /// Wait budget of a cycle, measured from its trigger instant.
    pub fn cycle_budget(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms.saturating_sub(self.deadline_margin_ms))
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

impl DownstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl BreakerConfig {
    fn validate(&self, table: &str) -> Result<()> {
        if self.request_volume_threshold == 0 {
            return Err(Error::Config(format!(
                "{table}.request_volume_threshold must be greater than zero"
            )));
        }
        if self.success_threshold == 0 {
            return Err(Error::Config(format!(
                "{table}.success_threshold must be greater than zero"
            )));
        }
        let ratio = self.failure_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::Config(format!(
                "{table}.failure_ratio must be in (0, 1], got {ratio}"
            )));
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
