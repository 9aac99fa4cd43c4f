//! Queue gateway: the narrow interface the engine uses to talk to the queue.
//!
//! A gateway receives bounded batches, acknowledges finished messages and
//! extends the invisibility of messages that should be retried later.

pub mod memory;
pub mod pgmq;

pub use memory::MemoryQueue;
pub use pgmq::PgmqGateway;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// One unit of work pulled from the queue.
///
/// Immutable once received. Not `Clone`: the ack token inside is single-use.
#[derive(Debug)]
pub struct WorkItem {
    pub id: String,
    pub body: String,
    /// How many times the queue has handed this message out, this receive included.
    pub redelivery_count: u32,
    pub ack_token: AckToken,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        body: impl Into<String>,
        redelivery_count: u32,
        ack_token: AckToken,
    ) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            redelivery_count: redelivery_count.max(1),
            ack_token,
        }
    }
}

/// Opaque receipt proving a message was received.
///
/// Gateway calls take it by value so it can be spent exactly once, on either
/// `acknowledge` or `extend_invisibility`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AckToken(String);

impl AckToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AckToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Receive at most `max_count` visible messages. An empty vec means the
    /// queue had nothing to hand out.
    async fn receive(&self, max_count: usize) -> Result<Vec<WorkItem>>;

    /// Remove a processed message. Acknowledging an already-removed message
    /// is not an error.
    async fn acknowledge(&self, token: AckToken) -> Result<()>;

    /// Hide a message from all consumers for `delay`.
    async fn extend_invisibility(&self, token: AckToken, delay: Duration) -> Result<()>;
}
