//! Rate limiting for repeated diagnostics.
//!
//! Hot paths (rejected records, idle sockets, per-cycle errors) would flood
//! the log at the loop rate. A `LogThrottle` lets one message through per
//! interval and counts what it swallowed in between.

use std::time::{Duration, Instant};

/// Minimum-interval gate for one diagnostic call site.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: u64,
}

impl LogThrottle {
    /// Throttle emitting at most once per `interval`.
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Throttle with the interval given in milliseconds.
    pub const fn from_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// Decide whether to emit at `now`.
    ///
    /// Returns `Some(suppressed)` (messages dropped since the last emission)
    /// when the caller should log, `None` otherwise.
    pub fn ready_at(&mut self, now: Instant) -> Option<u64> {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.suppressed += 1;
                None
            }
            _ => {
                self.last = Some(now);
                Some(std::mem::take(&mut self.suppressed))
            }
        }
    }

    /// [`ready_at`](Self::ready_at) with the current time.
    #[inline]
    pub fn ready(&mut self) -> Option<u64> {
        self.ready_at(Instant::now())
    }

    /// Forget the last emission; the next call is let through.
    pub fn reset(&mut self) {
        self.last = None;
        self.suppressed = 0;
    }
}
