//! Alerts produced by the health service and their text rendering.
//!
//! Delivery is abstracted behind [`AlertSink`]; the service never retries and
//! only logs delivery failures. [`AlertFormatter`] renders the message body so
//! every front-end words alerts the same way.

use core::fmt;
use core::time::Duration;

use crate::clock::Timestamp;
use crate::events::{Label, SensorStatus};
use crate::monitor::{Announcement, AnnouncementKind, MonitorId, Reason};
use crate::system::StartupReport;

/// Destination class of an alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertChannel {
    /// Subscribers interested in device health.
    Main,
    /// Maintenance traffic (startup, silent mode, protocol errors).
    Service,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertPriority {
    Low,
    Normal,
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AlertBody {
    Monitor(Announcement),
    Sensor { name: Label, status: SensorStatus },
    SilentMode(bool),
    TransportError(Label),
    Startup(StartupReport),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Alert {
    pub channel: AlertChannel,
    pub priority: AlertPriority,
    pub body: AlertBody,
}

impl Alert {
    #[must_use]
    pub fn monitor(announcement: Announcement) -> Self {
        let priority = match announcement.kind {
            AnnouncementKind::Failure => AlertPriority::High,
            AnnouncementKind::Recovery | AnnouncementKind::Degraded => AlertPriority::Normal,
            AnnouncementKind::Notice => AlertPriority::Low,
        };
        Self {
            channel: AlertChannel::Main,
            priority,
            body: AlertBody::Monitor(announcement),
        }
    }

    #[must_use]
    pub fn sensor(name: Label, status: SensorStatus) -> Self {
        let priority = if status.is_ok() {
            AlertPriority::Normal
        } else {
            AlertPriority::High
        };
        Self {
            channel: AlertChannel::Main,
            priority,
            body: AlertBody::Sensor { name, status },
        }
    }

    #[must_use]
    pub const fn silent_mode(enabled: bool) -> Self {
        Self {
            channel: AlertChannel::Service,
            priority: AlertPriority::Low,
            body: AlertBody::SilentMode(enabled),
        }
    }

    #[must_use]
    pub const fn transport_error(message: Label) -> Self {
        Self {
            channel: AlertChannel::Service,
            priority: AlertPriority::High,
            body: AlertBody::TransportError(message),
        }
    }

    #[must_use]
    pub const fn startup(report: StartupReport) -> Self {
        Self {
            channel: AlertChannel::Service,
            priority: AlertPriority::Normal,
            body: AlertBody::Startup(report),
        }
    }

    /// Monitor the alert originates from, if any.
    #[must_use]
    pub fn monitor_id(&self) -> Option<MonitorId> {
        match &self.body {
            AlertBody::Monitor(announcement) => Some(announcement.monitor),
            _ => None,
        }
    }
}

/// Receives alerts. Errors are reported back but never retried.
pub trait AlertSink {
    type Error: fmt::Debug;

    /// Delivers one alert.
    ///
    /// # Errors
    ///
    /// Returns the transport-specific error when delivery fails.
    fn deliver(&mut self, alert: &Alert) -> Result<(), Self::Error>;
}

impl<T: AlertSink + ?Sized> AlertSink for &mut T {
    type Error = T::Error;

    fn deliver(&mut self, alert: &Alert) -> Result<(), Self::Error> {
        (**self).deliver(alert)
    }
}

/// Renders wall-clock timestamps inside alert text.
pub trait TimestampFormat {
    /// Writes `at`. The default renders raw epoch seconds.
    fn write_timestamp(&self, out: &mut dyn fmt::Write, at: Timestamp) -> fmt::Result {
        write!(out, "@{}", at.as_secs())
    }
}

/// Timestamp renderer for platforms without calendar support.
#[derive(Clone, Copy, Debug, Default)]
pub struct EpochSeconds;

impl TimestampFormat for EpochSeconds {}

/// Outage length rendered as `1d 2h 3m 4s` (days only when non-zero).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutageDuration(pub Duration);

impl fmt::Display for OutageDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let days = total / 86_400;
        let hours = (total % 86_400) / 3_600;
        let minutes = (total % 3_600) / 60;
        let seconds = total % 60;
        if days > 0 {
            write!(f, "{days}d ")?;
        }
        write!(f, "{hours}h {minutes}m {seconds}s")
    }
}

/// Helper that renders an [`Alert`] into a single text message.
#[derive(Clone, Copy, Debug)]
pub struct AlertFormatter<'a, T> {
    timestamps: &'a T,
}

impl<'a, T: TimestampFormat> AlertFormatter<'a, T> {
    #[must_use]
    pub const fn new(timestamps: &'a T) -> Self {
        Self { timestamps }
    }

    /// Writes the message text for `alert`.
    pub fn write_alert<W: fmt::Write>(&self, writer: &mut W, alert: &Alert) -> fmt::Result {
        match &alert.body {
            AlertBody::Monitor(announcement) => self.write_announcement(writer, announcement),
            AlertBody::Sensor { name, status } if status.is_ok() => {
                write!(writer, "Sensor {name}: OK")
            }
            AlertBody::Sensor { name, status } => {
                write!(writer, "Sensor {name}: ERROR ({})", status.as_str())
            }
            AlertBody::SilentMode(true) => writer.write_str("Silent mode enabled"),
            AlertBody::SilentMode(false) => writer.write_str("Silent mode disabled"),
            AlertBody::TransportError(message) => write!(writer, "MQTT error: {message}"),
            AlertBody::Startup(report) => {
                write!(
                    writer,
                    "Device started: firmware {}, reset reason: {}",
                    report.version, report.boot
                )?;
                if let Some(heap) = report.heap {
                    write!(writer, ", heap {heap}")?;
                }
                if report.allocation_failures > 0 {
                    write!(
                        writer,
                        ", allocation failures {}",
                        report.allocation_failures
                    )?;
                }
                Ok(())
            }
        }
    }

    fn write_announcement<W: fmt::Write>(
        &self,
        writer: &mut W,
        announcement: &Announcement,
    ) -> fmt::Result {
        let subject = announcement.monitor.subject();
        writer.write_str(subject)?;
        if let Some(object) = &announcement.object {
            write!(writer, " {object}")?;
        }

        match announcement.kind {
            AnnouncementKind::Failure => {
                writer.write_str(" unavailable since ")?;
                self.timestamps
                    .write_timestamp(writer, announcement.failed_at)?;
                if let Some(reason) = announcement.reason.describe() {
                    write!(writer, ": {reason}")?;
                } else if announcement.reason != Reason::Unspecified {
                    write!(writer, ": {}", announcement.reason)?;
                }
                Ok(())
            }
            AnnouncementKind::Recovery => {
                writer.write_str(" available again, outage from ")?;
                self.timestamps
                    .write_timestamp(writer, announcement.failed_at)?;
                writer.write_str(" to ")?;
                self.timestamps.write_timestamp(writer, announcement.at)?;
                let outage = announcement.outage().unwrap_or_default();
                write!(writer, ", duration {}", OutageDuration(outage))
            }
            AnnouncementKind::Degraded => {
                writer.write_str(" degraded since ")?;
                self.timestamps.write_timestamp(writer, announcement.at)
            }
            AnnouncementKind::Notice => {
                writer.write_str(": ")?;
                match announcement.reason.describe() {
                    Some(text) => writer.write_str(text),
                    None => write!(writer, "{}", announcement.reason),
                }
            }
        }
    }
}
