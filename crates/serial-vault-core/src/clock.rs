//! Wall-clock abstraction.
//!
//! Nonce expiry, assertion timestamps and system-user validity windows all
//! read time through a [`Clock`] held in the application context, so tests
//! can move time forward without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time as a Unix timestamp in seconds.
    fn unix(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that follows system time plus an adjustable offset.
#[derive(Debug, Default)]
pub struct ManualClock {
    offset_secs: AtomicI64,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            offset_secs: AtomicI64::new(0),
        }
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + TimeDelta::seconds(self.offset_secs.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        let before = clock.unix();
        clock.advance(601);
        let after = clock.unix();
        assert!(after - before >= 601);
        assert!(after - before < 610);
    }

    #[test]
    fn system_clock_tracks_utc() {
        let delta = (SystemClock.unix() - Utc::now().timestamp()).abs();
        assert!(delta <= 1);
    }
}
