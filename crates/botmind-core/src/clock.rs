//! Time sources for the decision pipeline.
//!
//! Every timestamp in the core (snapshot capture, decision stamps, cache
//! buckets, state transitions, task records) comes from a [`TimeSource`]
//! injected at construction. Production code uses [`SystemClock`]; tests
//! drive staleness and expiry deterministically with [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// A source of wall-clock time.
pub trait TimeSource: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    /// Milliseconds since the Unix epoch.
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Create a clock reading the Unix epoch.
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Move the clock forward by `delta` (backward if negative).
    pub fn advance(&self, delta: TimeDelta) {
        let step = delta.num_milliseconds();
        // fetch_update only fails when the closure returns None.
        let _ = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(step))
            });
    }

    /// Move the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.advance(TimeDelta::try_milliseconds(ms).unwrap_or(TimeDelta::zero()));
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.store(instant.timestamp_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at_epoch();
        assert_eq!(clock.now(), DateTime::<Utc>::UNIX_EPOCH);

        clock.advance_ms(1500);
        assert_eq!(clock.now().timestamp_millis(), 1500);

        clock.advance(TimeDelta::seconds(2));
        assert_eq!(clock.now().timestamp_millis(), 3500);
    }

    #[test]
    fn manual_clock_set_overrides() {
        let clock = ManualClock::at_epoch();
        let target = DateTime::<Utc>::from_timestamp_millis(86_400_000)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        clock.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > DateTime::<Utc>::UNIX_EPOCH);
    }
}
