//! Inbound events consumed by the health service.
//!
//! Each upstream domain (link, reachability, transport, broker probes, time,
//! sensors, system) contributes one enum. Payloads are bounded `heapless`
//! strings so events can travel through static queues.

use core::fmt;

use heapless::String;

use crate::clock::Timestamp;
use crate::monitor::Reason;

/// Capacity of host names, access point names, and free-form messages.
pub const LABEL_CAPACITY: usize = 48;

/// Bounded text carried by events and alerts.
pub type Label = String<LABEL_CAPACITY>;

/// Copies `text` into a [`Label`], truncating on a character boundary.
#[must_use]
pub fn label(text: &str) -> Label {
    let mut out = Label::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Renders `host:port`, truncated to [`LABEL_CAPACITY`].
#[must_use]
pub fn endpoint_label(host: &str, port: u16) -> Label {
    let mut out = Label::new();
    if fmt::write(&mut out, format_args!("{host}:{port}")).is_err() {
        return label(host);
    }
    out
}

/// Transport endpoint identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Label,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: label(host),
            port,
        }
    }

    #[must_use]
    pub fn label(&self) -> Label {
        endpoint_label(&self.host, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    Init,
    Started,
    GotAddress { access_point: Option<Label> },
    Disconnected,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReachabilityEvent {
    Available,
    Slowdown,
    /// `since` carries the original outage start when the prober knows it.
    Unavailable { since: Option<Timestamp> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected {
        endpoint: Endpoint,
        primary: bool,
        local: bool,
    },
    Lost(Endpoint),
    ConnectFailed(Endpoint),
    PrimarySelected(Endpoint),
    SecondarySelected(Endpoint),
    ProtocolError(Label),
    ProtocolErrorCleared,
}

/// Broker whose reachability is probed independently of the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Broker {
    First,
    Second,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeEvent {
    Available {
        broker: Broker,
        host: Label,
    },
    Unavailable {
        broker: Broker,
        host: Label,
        since: Option<Timestamp>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeEvent {
    RtcAvailable,
    SyncConfirmed,
    SilentModeOn,
    SilentModeOff,
    MinuteTick,
}

/// Status vocabulary reported by sensor drivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorStatus {
    NotInitialized,
    Ok,
    Timeout,
    CalibrationError,
    CrcError,
    Error,
}

impl SensorStatus {
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, SensorStatus::Ok)
    }

    /// Statuses that raise the sensor's error bit: anything but `Ok`. A
    /// sensor that never reported keeps its bit clear because the router
    /// only acts on status changes.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        !self.is_ok()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SensorStatus::NotInitialized => "not initialized",
            SensorStatus::Ok => "ok",
            SensorStatus::Timeout => "timeout",
            SensorStatus::CalibrationError => "calibration error",
            SensorStatus::CrcError => "CRC error",
            SensorStatus::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorEvent {
    pub id: u8,
    pub status: SensorStatus,
    pub name: Label,
}

/// External services the device publishes data to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishTarget {
    Site,
    ThingSpeak,
    OpenMon,
    NarodMon,
}

impl PublishTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PublishTarget::Site => "site",
            PublishTarget::ThingSpeak => "thingspeak",
            PublishTarget::OpenMon => "openmon",
            PublishTarget::NarodMon => "narodmon",
        }
    }
}

/// Outbound notification channels whose failures are tracked as errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyChannel {
    Telegram,
    Smtp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SystemEvent {
    OtaStarted,
    OtaCleared,
    GeneralError {
        active: bool,
    },
    ChannelError {
        channel: NotifyChannel,
        active: bool,
    },
    PublishTarget {
        target: PublishTarget,
        active: bool,
        since: Option<Timestamp>,
        reason: Reason,
    },
    AllocationFailed {
        requested: u32,
    },
    /// Another component reports the "started" milestone.
    Started,
}

/// Every event the dispatcher accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthEvent {
    Link(LinkEvent),
    Reachability(ReachabilityEvent),
    Transport(TransportEvent),
    Probe(ProbeEvent),
    Time(TimeEvent),
    Sensor(SensorEvent),
    System(SystemEvent),
    /// A timer deadline may have passed; re-check watchdog and OTA timers.
    TimerElapsed,
}

impl HealthEvent {
    /// Domain tag used in logs.
    #[must_use]
    pub const fn domain(&self) -> &'static str {
        match self {
            HealthEvent::Link(_) => "link",
            HealthEvent::Reachability(_) => "inet",
            HealthEvent::Transport(_) => "mqtt",
            HealthEvent::Probe(_) => "probe",
            HealthEvent::Time(_) => "time",
            HealthEvent::Sensor(_) => "sensor",
            HealthEvent::System(_) => "system",
            HealthEvent::TimerElapsed => "timer",
        }
    }

    /// Sub-type tag used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            HealthEvent::Link(event) => match event {
                LinkEvent::Init => "init",
                LinkEvent::Started => "started",
                LinkEvent::GotAddress { .. } => "got-address",
                LinkEvent::Disconnected => "disconnected",
                LinkEvent::Stopped => "stopped",
            },
            HealthEvent::Reachability(event) => match event {
                ReachabilityEvent::Available => "available",
                ReachabilityEvent::Slowdown => "slowdown",
                ReachabilityEvent::Unavailable { .. } => "unavailable",
            },
            HealthEvent::Transport(event) => match event {
                TransportEvent::Connected { .. } => "connected",
                TransportEvent::Lost(_) => "lost",
                TransportEvent::ConnectFailed(_) => "connect-failed",
                TransportEvent::PrimarySelected(_) => "primary-selected",
                TransportEvent::SecondarySelected(_) => "secondary-selected",
                TransportEvent::ProtocolError(_) => "protocol-error",
                TransportEvent::ProtocolErrorCleared => "protocol-error-cleared",
            },
            HealthEvent::Probe(event) => match event {
                ProbeEvent::Available { .. } => "available",
                ProbeEvent::Unavailable { .. } => "unavailable",
            },
            HealthEvent::Time(event) => match event {
                TimeEvent::RtcAvailable => "rtc",
                TimeEvent::SyncConfirmed => "sync",
                TimeEvent::SilentModeOn => "silent-on",
                TimeEvent::SilentModeOff => "silent-off",
                TimeEvent::MinuteTick => "tick",
            },
            HealthEvent::Sensor(event) => event.status.as_str(),
            HealthEvent::System(event) => match event {
                SystemEvent::OtaStarted => "ota-started",
                SystemEvent::OtaCleared => "ota-cleared",
                SystemEvent::GeneralError { .. } => "general-error",
                SystemEvent::ChannelError { .. } => "channel-error",
                SystemEvent::PublishTarget { .. } => "publish-target",
                SystemEvent::AllocationFailed { .. } => "alloc-failed",
                SystemEvent::Started => "started",
            },
            HealthEvent::TimerElapsed => "elapsed",
        }
    }
}

impl fmt::Display for HealthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.domain(), self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_truncates_on_char_boundary() {
        let long = "жжжжжжжжжжжжжжжжжжжжжжжжжжжжжж";
        let truncated = label(long);
        assert_eq!(truncated.len(), LABEL_CAPACITY);
        assert!(truncated.chars().all(|ch| ch == 'ж'));
    }

    #[test]
    fn endpoint_label_joins_host_and_port() {
        assert_eq!(endpoint_label("b1", 1883).as_str(), "b1:1883");
        assert_eq!(Endpoint::new("broker.local", 8883).label().as_str(), "broker.local:8883");
    }

    #[test]
    fn events_render_domain_and_kind() {
        let mut rendered = heapless::String::<32>::new();
        let event = HealthEvent::Reachability(ReachabilityEvent::Unavailable { since: None });
        fmt::write(&mut rendered, format_args!("{event}")).expect("fits");
        assert_eq!(rendered.as_str(), "inet unavailable");
    }
}
