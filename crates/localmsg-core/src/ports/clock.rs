//! Clock port - time abstraction
//!
//! Message timestamps are epoch milliseconds. The reconciler derives its
//! staleness cutoff from the same clock, so tests swap in [`ManualClock`]
//! instead of sleeping past the threshold.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Clock provides the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Wall clock (production).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn at_millis(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by_ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now_ms.fetch_add(by_ms, Ordering::SeqCst);
    }

    pub fn set_millis(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }

    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_millis(3_500));
        assert_eq!(clock.now_ms(), start.timestamp_millis() + 3_500);
    }

    #[test]
    fn manual_clock_can_be_set_and_saturates_huge_steps() {
        let clock = ManualClock::at_millis(0);
        clock.set_millis(42);
        assert_eq!(clock.now_ms(), 42);

        clock.set_millis(-1);
        clock.advance(Duration::MAX);
        // i64::MAX added to -1 stays representable
        assert_eq!(clock.now_ms(), i64::MAX - 1);
    }

    #[test]
    fn system_clock_is_close_to_chrono_now() {
        let before = Utc::now().timestamp_millis();
        let now = SystemClock.now_ms();
        let after = Utc::now().timestamp_millis();
        assert!(before <= now && now <= after);
    }
}
