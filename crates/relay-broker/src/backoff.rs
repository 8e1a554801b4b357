//! Backoff schedules for dialing and retry republish.
//!
//! Two deliberately separate schedules. The dial backoff paces
//! reconnection attempts and is configurable. The republish delay is
//! the fixed `1000 × 2^(attempt − 1)` ms ladder producers rely on when
//! reasoning about redelivery timing; it is computed from the
//! post-increment attempt value, so the first retry waits 1 s.

use std::time::Duration;

/// Ceiling for the republish delay ladder.
pub const RETRY_DELAY_CAP_MS: u64 = 30_000;

/// Default initial dial backoff.
pub const DEFAULT_DIAL_INITIAL: Duration = Duration::from_secs(2);

/// Default dial backoff ceiling.
pub const DEFAULT_DIAL_MAX: Duration = Duration::from_secs(30);

/// Exponential backoff state for broker dial attempts.
///
/// Delays double from the initial value up to the ceiling, and reset
/// to the initial value after a successful connection.
#[derive(Debug, Clone)]
pub struct DialBackoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl DialBackoff {
    /// Creates a backoff starting at `initial` and capped at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max, next: initial }
    }

    /// Returns the next delay and advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Resets the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.next = self.initial;
    }
}

impl Default for DialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_DIAL_INITIAL, DEFAULT_DIAL_MAX)
    }
}

/// Delay in milliseconds for a republish carrying `attempt`.
///
/// `attempt` is the incremented value the republished envelope carries,
/// so the ladder runs 1 s, 2 s, 4 s, 8 s, ... capped at 30 s.
pub fn retry_delay_ms(attempt: u32) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let exponent = (attempt - 1).min(15);
    (1000u64 << exponent).min(RETRY_DELAY_CAP_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dial_backoff_doubles_to_cap() {
        let mut backoff = DialBackoff::default();

        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn dial_backoff_resets_after_success() {
        let mut backoff = DialBackoff::default();
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn republish_ladder_matches_schedule() {
        assert_eq!(retry_delay_ms(1), 1_000);
        assert_eq!(retry_delay_ms(2), 2_000);
        assert_eq!(retry_delay_ms(3), 4_000);
        assert_eq!(retry_delay_ms(4), 8_000);
        assert_eq!(retry_delay_ms(5), 16_000);
    }

    #[test]
    fn republish_ladder_caps_at_thirty_seconds() {
        assert_eq!(retry_delay_ms(6), 30_000);
        assert_eq!(retry_delay_ms(12), 30_000);
        assert_eq!(retry_delay_ms(u32::MAX), 30_000);
    }
}
