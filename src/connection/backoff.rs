//! Reconnect delay policy.

use crate::defaults;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Capped, linear-in-attempts reconnect delay.
///
/// `delay(n) = min(base * (n + 1), max)` where `n` counts consecutive failures
/// since the last successful connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the reconnect that follows failure number `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base
            .saturating_mul(attempt.saturating_add(1))
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(defaults::BASE_RECONNECT_DELAY_MS),
            Duration::from_millis(defaults::MAX_RECONNECT_DELAY_MS),
        )
    }
}

/// Consecutive failures since the last successful connect.
///
/// Written only by the connection loop; readable from any handle.
#[derive(Debug, Default)]
pub struct RetryCounter(AtomicU32);

impl RetryCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        // Saturates instead of wrapping back to a short delay.
        let current = self.get();
        self.0.store(current.saturating_add(1), Ordering::SeqCst);
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}
