//! Restart timer armed while the transport is expected but disconnected.

use core::ops::Add;
use core::time::Duration;

use crate::system::RestartReason;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase<I> {
    Disarmed,
    Armed { deadline: I },
}

/// One-shot restart timer.
///
/// Arming an already armed watchdog keeps the original deadline, so a flapping
/// prerequisite cannot postpone the restart indefinitely.
#[derive(Clone, Copy, Debug)]
pub struct RestartWatchdog<I> {
    timeout: Option<Duration>,
    phase: Phase<I>,
}

impl<I> RestartWatchdog<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Builds a watchdog with a timeout in minutes; zero disables it.
    #[must_use]
    pub fn from_minutes(minutes: u16) -> Self {
        let timeout = (minutes > 0).then(|| Duration::from_secs(u64::from(minutes) * 60));
        Self {
            timeout,
            phase: Phase::Disarmed,
        }
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self.phase, Phase::Armed { .. })
    }

    #[must_use]
    pub fn deadline(&self) -> Option<I> {
        match self.phase {
            Phase::Armed { deadline } => Some(deadline),
            Phase::Disarmed => None,
        }
    }

    /// Starts the countdown unless it is already running or disabled.
    /// Returns `true` when this call armed the timer.
    pub fn arm(&mut self, now: I) -> bool {
        match (self.timeout, self.phase) {
            (Some(timeout), Phase::Disarmed) => {
                let deadline = now + timeout;
                self.phase = Phase::Armed { deadline };
                log::info!("watchdog armed for {}s", timeout.as_secs());
                true
            }
            _ => false,
        }
    }

    /// Stops the countdown. Returns `true` when the timer was running.
    pub fn disarm(&mut self) -> bool {
        let was_armed = self.is_armed();
        if was_armed {
            log::info!("watchdog disarmed");
        }
        self.phase = Phase::Disarmed;
        was_armed
    }

    /// Replaces the timeout. A running countdown is restarted from `now`.
    pub fn reconfigure(&mut self, minutes: u16, now: I) {
        let was_armed = self.is_armed();
        *self = Self::from_minutes(minutes);
        if was_armed {
            self.arm(now);
        }
    }

    /// Reports the restart once the deadline has passed. The timer disarms
    /// itself so the restart is requested only once.
    pub fn poll(&mut self, now: I) -> Option<RestartReason> {
        match self.phase {
            Phase::Armed { deadline } if now >= deadline => {
                self.phase = Phase::Disarmed;
                Some(RestartReason::TransportTimeout)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Watchdog = RestartWatchdog<Duration>;

    const fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn fires_once_after_timeout() {
        let mut watchdog = Watchdog::from_minutes(1);
        assert!(watchdog.arm(secs(0)));
        assert_eq!(watchdog.poll(secs(59)), None);
        assert_eq!(watchdog.poll(secs(60)), Some(RestartReason::TransportTimeout));
        assert_eq!(watchdog.poll(secs(120)), None);
    }

    #[test]
    fn rearming_keeps_original_deadline() {
        let mut watchdog = Watchdog::from_minutes(1);
        assert!(watchdog.arm(secs(0)));
        assert!(!watchdog.arm(secs(30)));
        assert_eq!(watchdog.deadline(), Some(secs(60)));
    }

    #[test]
    fn disarm_cancels_restart() {
        let mut watchdog = Watchdog::from_minutes(1);
        watchdog.arm(secs(0));
        assert!(watchdog.disarm());
        assert_eq!(watchdog.poll(secs(600)), None);
        assert!(!watchdog.disarm());
    }

    #[test]
    fn zero_minutes_disables() {
        let mut watchdog = Watchdog::from_minutes(0);
        assert!(!watchdog.is_enabled());
        assert!(!watchdog.arm(secs(0)));
        assert_eq!(watchdog.poll(secs(1_000_000)), None);
    }

    #[test]
    fn reconfigure_restarts_running_countdown() {
        let mut watchdog = Watchdog::from_minutes(10);
        watchdog.arm(secs(0));
        watchdog.reconfigure(2, secs(100));
        assert_eq!(watchdog.deadline(), Some(secs(220)));

        let mut idle = Watchdog::from_minutes(10);
        idle.reconfigure(0, secs(100));
        assert!(!idle.is_armed());
        assert!(!idle.is_enabled());
    }
}
