//! Read-only status projection of the registries.
//!
//! [`StatusSnapshot`] mirrors the two flat JSON objects published by the
//! device (field names and 0/1 values are the stable contract).
//! [`StatusFormatter`] renders the same information as text lines for the
//! REPL front-ends.

use core::fmt;

use crate::conditions::Readiness;
use crate::flags::{ErrorFlag, StateFlag};
use crate::monitor::HealthMonitor;
use crate::registry::RegistrySnapshot;

/// State object of the status payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateReport {
    pub ota: u8,
    pub rtc_enabled: u8,
    pub sntp_sync: u8,
    pub silent_mode: u8,
    pub wifi_sta_started: u8,
    pub wifi_sta_connected: u8,
    pub inet_availabled: u8,
    pub mqtt1_enabled: u8,
    pub mqtt2_enabled: u8,
    pub mqtt_connected: u8,
    pub mqtt_primary: u8,
    pub mqtt_local: u8,
}

/// Error object of the status payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorReport {
    pub general: u8,
    pub heap: u8,
    pub mqtt: u8,
    pub telegram: u8,
    pub smtp: u8,
    pub site: u8,
    pub thingspeak: u8,
    pub openmon: u8,
    pub narodmon: u8,
    pub sensor0: u8,
    pub sensor1: u8,
    pub sensor2: u8,
    pub sensor3: u8,
    pub sensor4: u8,
    pub sensor5: u8,
    pub sensor6: u8,
    pub sensor7: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusSnapshot {
    pub states: StateReport,
    pub errors: ErrorReport,
}

impl From<RegistrySnapshot> for StatusSnapshot {
    fn from(snapshot: RegistrySnapshot) -> Self {
        let state = |flag| u8::from(snapshot.state(flag));
        let error = |flag| u8::from(snapshot.error(flag));
        Self {
            states: StateReport {
                ota: state(StateFlag::Ota),
                rtc_enabled: state(StateFlag::RtcEnabled),
                sntp_sync: state(StateFlag::SntpSynced),
                silent_mode: state(StateFlag::SilentMode),
                wifi_sta_started: state(StateFlag::WifiStarted),
                wifi_sta_connected: state(StateFlag::WifiConnected),
                inet_availabled: state(StateFlag::InetAvailable),
                mqtt1_enabled: state(StateFlag::Mqtt1Enabled),
                mqtt2_enabled: state(StateFlag::Mqtt2Enabled),
                mqtt_connected: state(StateFlag::MqttConnected),
                mqtt_primary: state(StateFlag::MqttPrimary),
                mqtt_local: state(StateFlag::MqttLocal),
            },
            errors: ErrorReport {
                general: error(ErrorFlag::General),
                heap: error(ErrorFlag::Heap),
                mqtt: error(ErrorFlag::Mqtt),
                telegram: error(ErrorFlag::Telegram),
                smtp: error(ErrorFlag::Smtp),
                site: error(ErrorFlag::Site),
                thingspeak: error(ErrorFlag::ThingSpeak),
                openmon: error(ErrorFlag::OpenMon),
                narodmon: error(ErrorFlag::NarodMon),
                sensor0: error(ErrorFlag::Sensor0),
                sensor1: error(ErrorFlag::Sensor1),
                sensor2: error(ErrorFlag::Sensor2),
                sensor3: error(ErrorFlag::Sensor3),
                sensor4: error(ErrorFlag::Sensor4),
                sensor5: error(ErrorFlag::Sensor5),
                sensor6: error(ErrorFlag::Sensor6),
                sensor7: error(ErrorFlag::Sensor7),
            },
        }
    }
}

/// Helper that renders registry state into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a RegistrySnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a RegistrySnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes `states wifi_sta_connected|inet_availabled`.
    pub fn write_states_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "states {}", self.snapshot.states)
    }

    /// Writes `errors none` or the active error names.
    pub fn write_errors_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "errors {}", self.snapshot.errors)
    }

    /// Writes `ready time=yes link=yes inet=no mqtt=no started=no`.
    pub fn write_readiness_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let readiness = Readiness::of(self.snapshot.states);
        let yes_no = |value: bool| if value { "yes" } else { "no" };
        write!(
            writer,
            "ready time={} link={} inet={} mqtt={} started={}",
            yes_no(readiness.time),
            yes_no(readiness.link),
            yes_no(readiness.internet),
            yes_no(readiness.transport),
            yes_no(self.snapshot.state(StateFlag::Started)),
        )
    }
}

/// Writes `monitor mqtt state=failure since=@1000 locked disabled object=b1:1883`.
pub fn write_monitor_line<W: fmt::Write>(writer: &mut W, monitor: &HealthMonitor) -> fmt::Result {
    write!(
        writer,
        "monitor {} state={}",
        monitor.id().as_str(),
        monitor.state().as_str()
    )?;
    if let Some(since) = monitor.failure_since() {
        write!(writer, " since=@{}", since.as_secs())?;
    }
    if monitor.is_locked() {
        writer.write_str(" locked")?;
    }
    if !monitor.is_enabled() {
        writer.write_str(" disabled")?;
    }
    if let Some(object) = monitor.object() {
        write!(writer, " object={object}")?;
    }
    Ok(())
}
