// Time types used across the project
//
// Wall-clock time is only used for log entry timestamps, redemption code
// validity windows and payment request bookkeeping. Nothing here must be
// deterministic across processes, but tests need to pin the clock, so every
// consumer goes through the `Clock` trait instead of calling
// `SystemTime::now()` directly.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Millis timestamps used to determine it using its type
pub type TimestampMillis = u64;

#[inline]
pub fn get_current_time() -> Duration {
    let start = SystemTime::now();

    start
        .duration_since(UNIX_EPOCH)
        .expect("Incorrect time returned from get_current_time")
}

// Return timestamp in milliseconds
// We cast it to u64 as we have plenty of time before it overflows
pub fn get_current_time_in_millis() -> TimestampMillis {
    get_current_time().as_millis() as TimestampMillis
}

/// Source of wall-clock time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> TimestampMillis;
}

/// Default clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> TimestampMillis {
        get_current_time_in_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }
}
