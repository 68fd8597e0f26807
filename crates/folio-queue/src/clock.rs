//! Monotonic-anchored wall clock.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::time::Instant;

/// Wall clock derived from the tokio monotonic clock.
///
/// The wall-clock time is captured once at construction and advanced by
/// [`tokio::time::Instant`], so job delays, backoff and stage timeouts never
/// jump with system clock adjustments. Under a paused tokio runtime the
/// clock advances with the test's virtual time.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor_timestamp: Timestamp,
    anchor_instant: Instant,
}

impl Clock {
    /// Creates a clock anchored at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(Timestamp::now())
    }

    /// Creates a clock anchored at the given timestamp.
    pub fn anchored_at(timestamp: Timestamp) -> Self {
        Self {
            anchor_timestamp: timestamp,
            anchor_instant: Instant::now(),
        }
    }

    /// Returns the current time.
    pub fn now(&self) -> Timestamp {
        add_duration(self.anchor_timestamp, self.anchor_instant.elapsed())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds a standard duration to a timestamp, saturating at the maximum.
pub(crate) fn add_duration(timestamp: Timestamp, duration: Duration) -> Timestamp {
    SignedDuration::try_from(duration)
        .ok()
        .and_then(|d| timestamp.checked_add(d).ok())
        .unwrap_or(Timestamp::MAX)
}

/// Subtracts a standard duration from a timestamp, saturating at the minimum.
pub(crate) fn sub_duration(timestamp: Timestamp, duration: Duration) -> Timestamp {
    SignedDuration::try_from(duration)
        .ok()
        .and_then(|d| timestamp.checked_sub(d).ok())
        .unwrap_or(Timestamp::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = Clock::anchored_at(Timestamp::UNIX_EPOCH);
        tokio::time::advance(Duration::from_secs(90)).await;

        let elapsed = clock.now().duration_since(Timestamp::UNIX_EPOCH);
        assert_eq!(elapsed.as_secs(), 90);
    }

    #[test]
    fn test_add_duration_saturates() {
        assert_eq!(
            add_duration(Timestamp::MAX, Duration::from_secs(1)),
            Timestamp::MAX
        );
        assert_eq!(
            sub_duration(Timestamp::MIN, Duration::from_secs(1)),
            Timestamp::MIN
        );
    }
}
