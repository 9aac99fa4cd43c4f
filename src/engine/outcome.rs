//! What happened to one message in one cycle.

use std::time::Duration;

/// Produced exactly once per received message per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Downstream call succeeded; the message was acknowledged (or the ack
    /// was attempted and logged on failure).
    Success { id: String },
    /// Downstream call failed; the message was hidden for a backoff delay.
    Rescheduled {
        id: String,
        attempt: u32,
        next_visibility_delay: Duration,
    },
    /// Redeliveries exhausted. The queue's dead-letter policy takes it from here.
    AbandonedMaxRetries { id: String, cause: String },
    /// Retry bookkeeping itself failed. Needs operator attention.
    Critical { id: String, cause: String },
}

impl ProcessingOutcome {
    pub fn id(&self) -> &str {
        match self {
            ProcessingOutcome::Success { id }
            | ProcessingOutcome::Rescheduled { id, .. }
            | ProcessingOutcome::AbandonedMaxRetries { id, .. }
            | ProcessingOutcome::Critical { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }

    /// Short label used in metrics and span fields.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingOutcome::Success { .. } => "success",
            ProcessingOutcome::Rescheduled { .. } => "rescheduled",
            ProcessingOutcome::AbandonedMaxRetries { .. } => "abandoned",
            ProcessingOutcome::Critical { .. } => "critical",
        }
    }
}
