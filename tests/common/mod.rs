//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cycleq::config::ConsumerConfig;
use cycleq::downstream::{DownstreamCaller, DownstreamError};
use cycleq::error::{Error, Result};
use cycleq::queue::{AckToken, MemoryQueue, QueueGateway, WorkItem};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Downstream double driven by the payload:
/// - `fail...` → fails
/// - `slow...` → sleeps `slow_latency` then succeeds
/// - anything else → sleeps `latency` then succeeds
pub struct ScriptedCaller {
    latency: Duration,
    slow_latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedCaller {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(10))
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            slow_latency: Duration::from_secs(5),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent invocations observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownstreamCaller for ScriptedCaller {
    async fn invoke(&self, payload: &str) -> std::result::Result<(), DownstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = if payload.starts_with("slow") {
            self.slow_latency
        } else {
            self.latency
        };
        tokio::time::sleep(latency).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if payload.starts_with("fail") {
            Err(DownstreamError::Failed(format!("scripted failure for {payload}")))
        } else {
            Ok(())
        }
    }
}

/// Wraps a `MemoryQueue` and fails exactly the `fail_on`-th receive call (1-based).
pub struct FlakyQueue {
    pub inner: MemoryQueue,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyQueue {
    pub fn new(inner: MemoryQueue, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl QueueGateway for FlakyQueue {
    async fn receive(&self, max_count: usize) -> Result<Vec<WorkItem>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(Error::Transport("flaky receive".into()));
        }
        self.inner.receive(max_count).await
    }

    async fn acknowledge(&self, token: AckToken) -> Result<()> {
        self.inner.acknowledge(token).await
    }

    async fn extend_invisibility(&self, token: AckToken, delay: Duration) -> Result<()> {
        self.inner.extend_invisibility(token, delay).await
    }
}

/// Gateway whose receive panics, for exercising the scheduler's flag release.
pub struct PanickingQueue;

#[async_trait]
impl QueueGateway for PanickingQueue {
    async fn receive(&self, _max_count: usize) -> Result<Vec<WorkItem>> {
        panic!("receive exploded");
    }

    async fn acknowledge(&self, _token: AckToken) -> Result<()> {
        Ok(())
    }

    async fn extend_invisibility(&self, _token: AckToken, _delay: Duration) -> Result<()> {
        Ok(())
    }
}

pub fn memory_queue() -> Arc<MemoryQueue> {
    Arc::new(MemoryQueue::new(Duration::from_secs(30)))
}

pub fn test_config() -> ConsumerConfig {
    ConsumerConfig::default()
}
