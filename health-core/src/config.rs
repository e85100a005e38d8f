//! Runtime configuration of the health service.

use core::fmt;
use core::time::Duration;

use crate::indicator::IndicatorPatterns;
use crate::monitor::MonitorId;

/// Longest accepted recovery threshold (one day).
pub const MAX_RECOVERY_THRESHOLD_SECS: u32 = 86_400;
/// Longest accepted watchdog timeout (one day).
pub const MAX_WATCHDOG_MINUTES: u16 = 1_440;
pub const MIN_OTA_VERIFY_SECS: u32 = 10;
pub const MAX_OTA_VERIFY_SECS: u32 = 3_600;

/// Per-monitor delivery toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MonitorToggles {
    pub wifi: bool,
    pub internet: bool,
    pub transport: bool,
    pub broker_probes: bool,
    pub openmon: bool,
    pub narodmon: bool,
    pub thingspeak: bool,
}

impl MonitorToggles {
    pub const ALL_ENABLED: Self = Self {
        wifi: true,
        internet: true,
        transport: true,
        broker_probes: true,
        openmon: true,
        narodmon: true,
        thingspeak: true,
    };

    #[must_use]
    pub const fn enabled(&self, id: MonitorId) -> bool {
        match id {
            MonitorId::Wifi => self.wifi,
            MonitorId::Internet => self.internet,
            MonitorId::Transport => self.transport,
            MonitorId::Broker1 | MonitorId::Broker2 => self.broker_probes,
            MonitorId::OpenMon => self.openmon,
            MonitorId::NarodMon => self.narodmon,
            MonitorId::ThingSpeak => self.thingspeak,
        }
    }
}

impl Default for MonitorToggles {
    fn default() -> Self {
        Self::ALL_ENABLED
    }
}

/// Optional alert categories outside the monitors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct NotifyToggles {
    pub transport_errors: bool,
    pub sensors: bool,
    pub silent_mode: bool,
    pub startup: bool,
    /// Announce degraded reachability, not only outages.
    pub degraded: bool,
}

impl NotifyToggles {
    pub const DEFAULT: Self = Self {
        transport_errors: true,
        sensors: true,
        silent_mode: false,
        startup: true,
        degraded: false,
    };
}

impl Default for NotifyToggles {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HealthConfig {
    /// Minimum outage length before a recovery is announced.
    pub recovery_threshold_secs: u32,
    pub monitors: MonitorToggles,
    pub notify: NotifyToggles,
    /// A separate prober confirms reachability. Without one, a connected
    /// link implies reachability.
    pub reachability_probe: bool,
    /// Transport watchdog timeout; zero disables the watchdog.
    pub watchdog_minutes: u16,
    pub ota_verify_secs: u32,
    pub restart_on_alloc_failure: bool,
    /// Device runs without network; the indicator only tracks time validity.
    pub offline: bool,
    pub indicator: IndicatorPatterns,
}

impl HealthConfig {
    pub const DEFAULT: Self = Self {
        recovery_threshold_secs: 60,
        monitors: MonitorToggles::ALL_ENABLED,
        notify: NotifyToggles::DEFAULT,
        reachability_probe: true,
        watchdog_minutes: 30,
        ota_verify_secs: 300,
        restart_on_alloc_failure: false,
        offline: false,
        indicator: IndicatorPatterns::DEFAULT,
    };

    #[must_use]
    pub fn recovery_threshold(&self) -> Duration {
        Duration::from_secs(u64::from(self.recovery_threshold_secs))
    }

    #[must_use]
    pub fn ota_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.ota_verify_secs))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recovery_threshold_secs == 0
            || self.recovery_threshold_secs > MAX_RECOVERY_THRESHOLD_SECS
        {
            return Err(ConfigError::RecoveryThreshold(self.recovery_threshold_secs));
        }
        if self.watchdog_minutes > MAX_WATCHDOG_MINUTES {
            return Err(ConfigError::WatchdogMinutes(self.watchdog_minutes));
        }
        if !(MIN_OTA_VERIFY_SECS..=MAX_OTA_VERIFY_SECS).contains(&self.ota_verify_secs) {
            return Err(ConfigError::OtaVerifySecs(self.ota_verify_secs));
        }
        let patterns = &self.indicator;
        let all = [
            patterns.ota,
            patterns.general_error,
            patterns.sensor_error,
            patterns.link_down,
            patterns.internet_down,
            patterns.time_invalid,
            patterns.transport_down,
            patterns.publish_error,
            patterns.notify_error,
        ];
        if all
            .iter()
            .any(|pattern| pattern.quantity == 0 || pattern.duration_ms == 0)
        {
            return Err(ConfigError::IndicatorPattern);
        }
        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Rejected configuration value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigError {
    RecoveryThreshold(u32),
    WatchdogMinutes(u16),
    OtaVerifySecs(u32),
    IndicatorPattern,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::RecoveryThreshold(value) => write!(
                f,
                "recovery threshold {value}s outside 1..={MAX_RECOVERY_THRESHOLD_SECS}s"
            ),
            ConfigError::WatchdogMinutes(value) => write!(
                f,
                "watchdog timeout {value}min exceeds {MAX_WATCHDOG_MINUTES}min"
            ),
            ConfigError::OtaVerifySecs(value) => write!(
                f,
                "ota verification window {value}s outside {MIN_OTA_VERIFY_SECS}..={MAX_OTA_VERIFY_SECS}s"
            ),
            ConfigError::IndicatorPattern => {
                f.write_str("indicator patterns need a non-zero quantity and duration")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
