//! Metric instrument factories for cycleq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"cycleq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for cycleq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("cycleq")
}

/// Counter: cycle triggers.
/// Labels: `result` ("started" | "skipped" | "interrupted" | "failed").
pub fn cycles() -> Counter<u64> {
    meter()
        .u64_counter("cycleq.cycles")
        .with_description("Number of cycle triggers by result")
        .build()
}

/// Counter: messages received from the queue.
pub fn messages_received() -> Counter<u64> {
    meter()
        .u64_counter("cycleq.messages.received")
        .with_description("Number of messages received from the queue")
        .build()
}

/// Counter: per-message processing outcomes.
/// Labels: `outcome` ("success" | "rescheduled" | "abandoned" | "critical").
pub fn message_outcomes() -> Counter<u64> {
    meter()
        .u64_counter("cycleq.messages.outcomes")
        .with_description("Number of processed messages by outcome")
        .build()
}

/// Counter: queue-level operations (create, send, read, set_vt, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("cycleq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: downstream calls.
/// Labels: `result` ("ok" | "error" | "timeout" | "rejected").
pub fn downstream_calls() -> Counter<u64> {
    meter()
        .u64_counter("cycleq.downstream.calls")
        .with_description("Number of downstream calls by result")
        .build()
}

/// Counter: circuit breaker state transitions.
/// Labels: `breaker`, `from`, `to`.
pub fn circuit_transitions() -> Counter<u64> {
    meter()
        .u64_counter("cycleq.circuit.transitions")
        .with_description("Number of circuit breaker state transitions")
        .build()
}

/// Histogram: wall-clock duration of a cycle body in milliseconds.
pub fn cycle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("cycleq.cycle.duration_ms")
        .with_description("Cycle duration in milliseconds")
        .with_unit("ms")
        .build()
}
