//! Time sources consumed by the health service.
//!
//! Two clocks are involved: a monotonic instant for deadlines (watchdog and
//! OTA verification) and a wall-clock [`Timestamp`] stamped on failures and
//! recoveries so alerts can report when an outage began.

use core::ops::Add;
use core::time::Duration;

/// Wall-clock seconds (Unix epoch once time is synchronized).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(u64);

impl Timestamp {
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    #[must_use]
    pub const fn as_secs(self) -> u64 {
        self.0
    }

    /// Elapsed time since `earlier`, zero when `earlier` is in the future.
    #[must_use]
    pub const fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_secs(self.0.saturating_sub(earlier.0))
    }

    /// Moves the timestamp back by `duration`, saturating at zero.
    #[must_use]
    pub const fn saturating_sub(self, duration: Duration) -> Timestamp {
        Timestamp(self.0.saturating_sub(duration.as_secs()))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs.as_secs()))
    }
}

/// Platform clock.
pub trait Clock {
    /// Monotonic instant used for deadlines.
    type Instant: Copy + Ord + Add<Duration, Output = Self::Instant>;

    /// Current monotonic instant.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time.
    fn wall_time(&self) -> Timestamp;
}

impl<T: Clock + ?Sized> Clock for &T {
    type Instant = T::Instant;

    fn now(&self) -> Self::Instant {
        (**self).now()
    }

    fn wall_time(&self) -> Timestamp {
        (**self).wall_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_arithmetic() {
        let start = Timestamp::from_secs(100);
        assert_eq!(
            Timestamp::from_secs(190).saturating_since(start),
            Duration::from_secs(90)
        );
        assert_eq!(
            Timestamp::from_secs(50).saturating_since(start),
            Duration::ZERO
        );
        assert_eq!(
            start.saturating_sub(Duration::from_secs(400)),
            Timestamp::from_secs(0)
        );
        assert_eq!(start + Duration::from_secs(20), Timestamp::from_secs(120));
    }
}
