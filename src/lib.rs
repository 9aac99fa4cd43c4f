//! # cycleq
//!
//! Bounded-cycle queue consumer.
//!
//! Every cycle drains up to a target number of messages from a queue
//! (pgmq in Postgres, or any [`queue::QueueGateway`]), calls a downstream
//! service for each one under an admission limit and a soft deadline, and
//! acknowledges, reschedules with exponential backoff, or abandons each
//! message to the queue's dead-letter policy.

pub mod config;
pub mod db;
pub mod downstream;
pub mod engine;
pub mod error;
pub mod queue;
pub mod telemetry;
