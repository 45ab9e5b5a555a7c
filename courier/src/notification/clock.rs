//! Wall-clock abstraction for queue state transitions.
//!
//! Everything the pipeline persists is in Unix seconds, so the clock hands
//! out seconds directly. Tests drive [`ManualClock`] to assert exact backoff
//! times without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::database::time::now_secs;

/// Source of "now" for the notification pipeline.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now(&self) -> i64;
}

/// Real UTC time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        now_secs()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    pub fn new(start_secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(start_secs),
        }
    }

    /// Advance by whole seconds; sub-second parts are dropped.
    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);

        clock.advance(Duration::from_millis(2_500));
        assert_eq!(clock.now(), 1_002);

        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
