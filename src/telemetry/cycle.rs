//! Cycle and message span helpers.
//!
//! Provides span creation and state-transition recording for cycles and the
//! messages flowing through them.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one cycle body.
pub fn start_cycle_span(cycle_id: &Uuid) -> Span {
    tracing::info_span!(
        "cycle.run",
        "cycle.id" = %cycle_id,
        "cycle.received" = tracing::field::Empty,
    )
}

/// Start a span for processing a single message.
///
/// The `message.outcome` field is declared empty and filled in once the
/// message reaches a terminal state.
pub fn start_message_span(message_id: &str, redelivery_count: u32) -> Span {
    tracing::debug_span!(
        "message.process",
        "message.id" = message_id,
        "message.redelivery_count" = redelivery_count,
        "message.outcome" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
