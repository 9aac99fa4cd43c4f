//! Downstream caller: the per-message call the consumer exists to make.
//!
//! The engine only sees [`DownstreamCaller`]. Timeout, circuit breaking and
//! rate tracking live in [`ProtectedCaller`], which wraps any caller.

pub mod breaker;
pub mod command;
pub mod protected;
pub mod rate;

pub use breaker::{CircuitBreaker, CircuitState};
pub use command::CommandCaller;
pub use protected::ProtectedCaller;
pub use rate::RateTracker;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DownstreamError {
    #[error("downstream call failed: {0}")]
    Failed(String),

    #[error("downstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("circuit breaker is open")]
    CircuitOpen,
}

#[async_trait]
pub trait DownstreamCaller: Send + Sync {
    async fn invoke(&self, payload: &str) -> Result<(), DownstreamError>;
}
