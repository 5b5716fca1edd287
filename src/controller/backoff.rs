//! # Fibonacci Backoff
//!
//! Progressive backoff for failing reconciles.
//!
//! Durations follow the Fibonacci sequence scaled by the floor and capped at
//! the ceiling: `min, min, 2*min, 3*min, 5*min, ...`.

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    /// Create a backoff between `min_secs` and `max_secs`
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: 1,
        }
    }

    /// Next backoff in seconds, advancing the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let value = self.current.saturating_mul(self.min_secs).min(self.max_secs);
        if value < self.max_secs {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        value
    }
}
