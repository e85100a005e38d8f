//! Composite readiness conditions derived from registry snapshots.
//!
//! Every function here is pure: it reads a [`StateSet`] and never mutates a
//! registry. Reachability counts as available while degraded.

use crate::flags::{StateFlag, StateSet, TIME_VALID};

/// The wall clock is trustworthy (RTC or network sync).
#[must_use]
pub fn time_valid(states: StateSet) -> bool {
    states.intersects(TIME_VALID)
}

/// Silent mode only counts once the clock is valid.
#[must_use]
pub fn silent_mode(states: StateSet) -> bool {
    time_valid(states) && states.has(StateFlag::SilentMode)
}

#[must_use]
pub fn link_connected(states: StateSet) -> bool {
    states.has(StateFlag::WifiConnected)
}

/// Link connected and the internet reachable (degraded included).
#[must_use]
pub fn internet_available(states: StateSet) -> bool {
    link_connected(states) && states.has(StateFlag::InetAvailable)
}

/// Internet available but flagged as slow.
#[must_use]
pub fn internet_degraded(states: StateSet) -> bool {
    internet_available(states) && states.has(StateFlag::InetSlowdown)
}

/// Internet available, not degraded, and the radio reports a usable signal.
#[must_use]
pub fn internet_good(states: StateSet, signal_ok: bool) -> bool {
    internet_available(states) && !states.has(StateFlag::InetSlowdown) && signal_ok
}

/// The transport is expected to be reachable: a local broker needs only the
/// link, a remote one needs the internet.
#[must_use]
pub fn transport_expected(states: StateSet) -> bool {
    if states.has(StateFlag::MqttLocal) {
        link_connected(states)
    } else {
        internet_available(states)
    }
}

#[must_use]
pub fn transport_connected(states: StateSet) -> bool {
    states.has(StateFlag::MqttConnected)
}

/// Prerequisites of the one-time "system started" edge.
#[must_use]
pub fn ready_to_start(states: StateSet) -> bool {
    time_valid(states)
        && link_connected(states)
        && internet_available(states)
        && transport_connected(states)
}

#[must_use]
pub fn system_started(states: StateSet) -> bool {
    states.has(StateFlag::Started)
}

/// Boolean view of the readiness inputs, handy for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Readiness {
    pub time: bool,
    pub link: bool,
    pub internet: bool,
    pub transport: bool,
}

impl Readiness {
    #[must_use]
    pub fn of(states: StateSet) -> Self {
        Self {
            time: time_valid(states),
            link: link_connected(states),
            internet: internet_available(states),
            transport: transport_connected(states),
        }
    }

    #[must_use]
    pub const fn all(self) -> bool {
        self.time && self.link && self.internet && self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internet_requires_link() {
        let reachable_only = StateSet::from(StateFlag::InetAvailable);
        assert!(!internet_available(reachable_only));

        let both = StateFlag::WifiConnected | StateFlag::InetAvailable;
        assert!(internet_available(both));
    }

    #[test]
    fn degraded_internet_is_still_available_but_not_good() {
        let degraded =
            (StateFlag::WifiConnected | StateFlag::InetAvailable).with(StateFlag::InetSlowdown);
        assert!(internet_available(degraded));
        assert!(internet_degraded(degraded));
        assert!(!internet_good(degraded, true));
    }

    #[test]
    fn local_transport_needs_only_link() {
        let local = StateFlag::WifiConnected | StateFlag::MqttLocal;
        assert!(transport_expected(local));

        let remote = StateSet::from(StateFlag::WifiConnected);
        assert!(!transport_expected(remote));
        assert!(transport_expected(remote.with(StateFlag::InetAvailable)));
    }

    #[test]
    fn silent_mode_needs_valid_time() {
        let silent = StateSet::from(StateFlag::SilentMode);
        assert!(!silent_mode(silent));
        assert!(silent_mode(silent.with(StateFlag::SntpSynced)));
    }

    #[test]
    fn readiness_needs_all_four_inputs() {
        let mut states = StateFlag::RtcEnabled | StateFlag::WifiConnected;
        states = states.with(StateFlag::InetAvailable);
        assert!(!ready_to_start(states));
        assert_eq!(
            Readiness::of(states),
            Readiness {
                time: true,
                link: true,
                internet: true,
                transport: false
            }
        );

        assert!(ready_to_start(states.with(StateFlag::MqttConnected)));
    }
}
