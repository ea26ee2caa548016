//! Monotonic clock adapter.
//!
//! Feeds the millisecond timestamps the flush heuristics run on. The
//! value wraps at `u32::MAX` the same way a firmware tick counter does;
//! the flush checks use wrapping arithmetic.

use std::time::Instant;

use crate::app::ports::Clock;

/// Milliseconds since construction, from `std::time::Instant`.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}
