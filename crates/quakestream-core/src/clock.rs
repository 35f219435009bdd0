//! Engine time source.
//!
//! Every engine operation takes "now" as an explicit epoch-millisecond
//! argument, so state transitions are deterministic given their inputs.
//! Only the runner asks a [`Clock`] for the current time, which lets tests
//! and replays substitute a [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};

/// A source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `now_ms`.
    pub const fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    /// Set the current reading.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move the reading forward by `delta_ms` (saturating).
    pub fn advance(&self, delta_ms: i64) {
        let current = self.now.load(Ordering::SeqCst);
        self.now.store(current.saturating_add(delta_ms), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Convert epoch seconds to epoch milliseconds, rounding to the nearest
/// millisecond. Returns `None` for non-finite or out-of-range input.
pub fn seconds_to_ms(seconds: f64) -> Option<i64> {
    /// Seconds beyond which the millisecond value no longer fits in i64.
    const LIMIT_SECONDS: f64 = 9.0e15;

    if !seconds.is_finite() || seconds.abs() > LIMIT_SECONDS {
        return None;
    }
    // Range-checked above.
    #[allow(clippy::cast_possible_truncation)]
    let millis = (seconds * 1000.0).round() as i64;
    Some(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn seconds_conversion_rounds_to_millis() {
        assert_eq!(seconds_to_ms(1000.99), Some(1_000_990));
        assert_eq!(seconds_to_ms(1003.0), Some(1_003_000));
        assert_eq!(seconds_to_ms(f64::NAN), None);
        assert_eq!(seconds_to_ms(f64::INFINITY), None);
    }
}
