//! # Fibonacci Backoff
//!
//! Retry delays for failed reconciles. Grows more slowly than exponential
//! backoff so a flapping API server or notebook endpoint is retried promptly
//! without piling up requests.
//!
//! Sequence: 1s, 1s, 2s, 3s, 5s, 8s, ... capped at 300s.

use std::time::Duration;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_seconds: u64,
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_seconds` and capped at `max_seconds`
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_seconds;

        let next = self.prev_seconds.saturating_add(self.current_seconds);
        self.prev_seconds = self.current_seconds;
        self.current_seconds = next.min(self.max_seconds);

        Duration::from_secs(result)
    }
}
