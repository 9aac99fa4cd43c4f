//! Cycle orchestration engine.
//!
//! The scheduler fires a cycle every period. A cycle pulls a bounded batch,
//! fans it out to message processors under an admission limit and a soft
//! deadline, then reports per-cycle statistics.

pub mod cycle;
pub mod dispatcher;
pub mod outcome;
pub mod processor;
pub mod receiver;
pub mod retry;
pub mod scheduler;
pub mod stats;

pub use cycle::{Cycle, CycleReport};
pub use dispatcher::{ConcurrentDispatcher, DispatchReport};
pub use outcome::ProcessingOutcome;
pub use processor::MessageProcessor;
pub use receiver::BatchReceiver;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{CycleScheduler, Trigger};
pub use stats::{CycleStats, CycleSummary};
