//! Status indicator pattern selection.
//!
//! The indicator shows the highest-priority unresolved condition. Selection
//! is a pure function of a [`RegistrySnapshot`]; [`IndicatorObserver`] hooks
//! it onto registry notifications so mutators never call it directly.

use portable_atomic::{AtomicBool, Ordering};

use crate::conditions;
use crate::flags::{ErrorFlag, NOTIFY_ERRORS, PUBLISH_ERRORS, SENSOR_ERRORS, StateFlag};
use crate::registry::{RegistryObserver, RegistrySnapshot};

/// Repeated on/off pulses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlinkPattern {
    /// Pulses per cycle.
    pub quantity: u8,
    /// On-time of each pulse, in milliseconds.
    pub duration_ms: u16,
    /// Pause between cycles, in milliseconds.
    pub interval_ms: u16,
}

impl BlinkPattern {
    #[must_use]
    pub const fn new(quantity: u8, duration_ms: u16, interval_ms: u16) -> Self {
        Self {
            quantity,
            duration_ms,
            interval_ms,
        }
    }
}

/// Command sent to the indicator driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorCommand {
    On,
    Off,
    /// One burst of pulses, then back to the previous pattern.
    Flash(BlinkPattern),
    /// Repeat the pattern until replaced.
    Blink(BlinkPattern),
    BlinkOff,
    /// Enables or blanks the indicator (silent mode).
    Enable(bool),
}

/// Pattern assigned to each indicated condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct IndicatorPatterns {
    pub ota: BlinkPattern,
    pub general_error: BlinkPattern,
    pub sensor_error: BlinkPattern,
    pub link_down: BlinkPattern,
    pub internet_down: BlinkPattern,
    pub time_invalid: BlinkPattern,
    pub transport_down: BlinkPattern,
    pub publish_error: BlinkPattern,
    pub notify_error: BlinkPattern,
}

impl IndicatorPatterns {
    pub const DEFAULT: Self = Self {
        ota: BlinkPattern::new(1, 50, 150),
        general_error: BlinkPattern::new(1, 1000, 1000),
        sensor_error: BlinkPattern::new(5, 100, 1000),
        link_down: BlinkPattern::new(1, 100, 1000),
        internet_down: BlinkPattern::new(2, 100, 1000),
        time_invalid: BlinkPattern::new(3, 100, 1000),
        transport_down: BlinkPattern::new(4, 100, 1000),
        publish_error: BlinkPattern::new(2, 250, 3000),
        notify_error: BlinkPattern::new(3, 250, 3000),
    };
}

impl Default for IndicatorPatterns {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Picks the command for the highest-priority active condition.
///
/// Order: OTA, general error, sensor errors, link down, internet down, time
/// invalid, transport down or erroring, publish errors, notification errors,
/// then normal (indicator off). Offline devices only check time validity.
#[must_use]
pub fn select(
    snapshot: RegistrySnapshot,
    patterns: &IndicatorPatterns,
    offline: bool,
) -> IndicatorCommand {
    let states = snapshot.states;
    let errors = snapshot.errors;

    let pattern = if states.has(StateFlag::Ota) {
        Some(patterns.ota)
    } else if errors.has(ErrorFlag::General) {
        Some(patterns.general_error)
    } else if errors.intersects(SENSOR_ERRORS) {
        Some(patterns.sensor_error)
    } else if offline {
        (!conditions::time_valid(states)).then_some(patterns.time_invalid)
    } else if !conditions::link_connected(states) {
        Some(patterns.link_down)
    } else if !conditions::internet_available(states) {
        Some(patterns.internet_down)
    } else if !conditions::time_valid(states) {
        Some(patterns.time_invalid)
    } else if !conditions::transport_connected(states) || errors.has(ErrorFlag::Mqtt) {
        Some(patterns.transport_down)
    } else if errors.intersects(PUBLISH_ERRORS) {
        Some(patterns.publish_error)
    } else if errors.intersects(NOTIFY_ERRORS) {
        Some(patterns.notify_error)
    } else {
        None
    };

    pattern.map_or(IndicatorCommand::BlinkOff, IndicatorCommand::Blink)
}

/// Actuates indicator commands.
pub trait IndicatorDriver {
    fn apply(&self, command: IndicatorCommand);
}

impl<T: IndicatorDriver + ?Sized> IndicatorDriver for &T {
    fn apply(&self, command: IndicatorCommand) {
        (**self).apply(command);
    }
}

/// Registry observer that keeps the indicator in sync.
///
/// Silent mode blanks the indicator through [`IndicatorCommand::Enable`] on
/// its edges only; pattern selection keeps running underneath.
pub struct IndicatorObserver<D> {
    driver: D,
    patterns: IndicatorPatterns,
    offline: bool,
    silenced: AtomicBool,
}

impl<D> IndicatorObserver<D> {
    #[must_use]
    pub const fn new(driver: D, patterns: IndicatorPatterns, offline: bool) -> Self {
        Self {
            driver,
            patterns,
            offline,
            silenced: AtomicBool::new(false),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

impl<D: IndicatorDriver> RegistryObserver for IndicatorObserver<D> {
    fn registry_changed(&self, snapshot: RegistrySnapshot) {
        let silent = conditions::silent_mode(snapshot.states);
        if self.silenced.swap(silent, Ordering::AcqRel) != silent {
            self.driver.apply(IndicatorCommand::Enable(!silent));
        }
        self.driver
            .apply(select(snapshot, &self.patterns, self.offline));
    }
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use heapless::Vec;

    use super::*;
    use crate::flags::{ErrorSet, StateSet};

    fn healthy() -> StateSet {
        StateSet::of(&[
            StateFlag::WifiConnected,
            StateFlag::InetAvailable,
            StateFlag::MqttConnected,
            StateFlag::SntpSynced,
        ])
    }

    fn pick(states: StateSet, errors: ErrorSet) -> IndicatorCommand {
        select(
            RegistrySnapshot::new(states, errors),
            &IndicatorPatterns::DEFAULT,
            false,
        )
    }

    #[test]
    fn healthy_device_turns_indicator_off() {
        assert_eq!(pick(healthy(), ErrorSet::empty()), IndicatorCommand::BlinkOff);
    }

    #[test]
    fn ota_outranks_everything() {
        let errors = ErrorFlag::General | ErrorFlag::Sensor3;
        assert_eq!(
            pick(StateSet::from(StateFlag::Ota), errors),
            IndicatorCommand::Blink(IndicatorPatterns::DEFAULT.ota)
        );
    }

    #[test]
    fn priorities_follow_documented_order() {
        let patterns = IndicatorPatterns::DEFAULT;
        let errors = ErrorSet::from(ErrorFlag::Sensor0);
        assert_eq!(
            pick(StateSet::empty(), errors),
            IndicatorCommand::Blink(patterns.sensor_error)
        );
        assert_eq!(
            pick(StateSet::empty(), ErrorSet::empty()),
            IndicatorCommand::Blink(patterns.link_down)
        );
        assert_eq!(
            pick(StateSet::from(StateFlag::WifiConnected), ErrorSet::empty()),
            IndicatorCommand::Blink(patterns.internet_down)
        );

        let no_time = StateFlag::WifiConnected | StateFlag::InetAvailable;
        assert_eq!(
            pick(no_time, ErrorSet::empty()),
            IndicatorCommand::Blink(patterns.time_invalid)
        );
        assert_eq!(
            pick(healthy(), ErrorSet::from(ErrorFlag::Mqtt)),
            IndicatorCommand::Blink(patterns.transport_down)
        );
        assert_eq!(
            pick(healthy(), ErrorFlag::ThingSpeak | ErrorFlag::Telegram),
            IndicatorCommand::Blink(patterns.publish_error)
        );
        assert_eq!(
            pick(healthy(), ErrorSet::from(ErrorFlag::Smtp)),
            IndicatorCommand::Blink(patterns.notify_error)
        );
    }

    #[test]
    fn offline_mode_checks_only_time() {
        let patterns = IndicatorPatterns::DEFAULT;
        let offline = |states: StateSet| {
            select(
                RegistrySnapshot::new(states, ErrorSet::empty()),
                &patterns,
                true,
            )
        };
        assert_eq!(
            offline(StateSet::empty()),
            IndicatorCommand::Blink(patterns.time_invalid)
        );
        assert_eq!(
            offline(StateSet::from(StateFlag::RtcEnabled)),
            IndicatorCommand::BlinkOff
        );
    }

    #[derive(Default)]
    struct RecordingDriver {
        commands: RefCell<Vec<IndicatorCommand, 16>>,
    }

    impl IndicatorDriver for RecordingDriver {
        fn apply(&self, command: IndicatorCommand) {
            self.commands
                .borrow_mut()
                .push(command)
                .expect("recording capacity");
        }
    }

    #[test]
    fn silent_mode_edges_toggle_enable() {
        let observer = IndicatorObserver::new(
            RecordingDriver::default(),
            IndicatorPatterns::DEFAULT,
            false,
        );

        let silent = healthy().with(StateFlag::SilentMode);
        observer.registry_changed(RegistrySnapshot::new(silent, ErrorSet::empty()));
        observer.registry_changed(RegistrySnapshot::new(silent, ErrorSet::empty()));
        observer.registry_changed(RegistrySnapshot::new(healthy(), ErrorSet::empty()));

        let commands = observer.driver().commands.borrow();
        assert_eq!(
            commands.as_slice(),
            &[
                IndicatorCommand::Enable(false),
                IndicatorCommand::BlinkOff,
                IndicatorCommand::BlinkOff,
                IndicatorCommand::Enable(true),
                IndicatorCommand::BlinkOff,
            ]
        );
    }
}
