//! Calls-per-second tracking for the downstream service.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

const WINDOW: Duration = Duration::from_secs(1);

/// Counts calls in one-second windows and warns once a window passes the
/// configured threshold.
pub struct RateTracker {
    threshold: u32,
    window: Mutex<(Instant, u32)>,
}

impl RateTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            window: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Count one call. Returns the count for the current window.
    pub fn track(&self) -> u32 {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if now.duration_since(window.0) >= WINDOW {
            *window = (now, 0);
        }
        window.1 += 1;
        let count = window.1;
        drop(window);

        if count > self.threshold {
            warn!(current_tps = count, threshold = self.threshold, "approaching downstream rate limit");
        }
        count
    }
}
