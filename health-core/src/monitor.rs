//! Per-subsystem health monitors.
//!
//! A [`HealthMonitor`] owns the failure/recovery bookkeeping for one
//! subsystem and decides whether a transition is worth announcing. The
//! decision rules:
//!
//! - failures are announced on entry, by [`MonitorKind::Auto`] monitors only;
//! - a recovery is announced when the outage lasted at least the shared
//!   threshold (or the outage was forced significant);
//! - nothing is announced while the monitor is locked or disabled, but the
//!   bookkeeping keeps running;
//! - a failure that begins while locked is attributed to the parent that
//!   holds the lock and its recovery stays silent. If it outlives the lock,
//!   the outage is re-measured from the unlock.
//!
//! Announcements are returned to the caller; delivery happens elsewhere.

use core::fmt;
use core::time::Duration;

use crate::clock::Timestamp;
use crate::events::{Label, label};

/// Logical state of a monitored subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthState {
    Ok,
    Degraded,
    Failure,
}

impl HealthState {
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, HealthState::Failure)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Degraded => "degraded",
            HealthState::Failure => "failure",
        }
    }
}

/// Which edges a monitor announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorKind {
    /// Announces failures and recoveries.
    Auto,
    /// Announces recoveries only; the failure is implied by a parent.
    RecoveryOnly,
}

/// Monitored subsystems.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MonitorId {
    Wifi,
    Internet,
    Transport,
    Broker1,
    Broker2,
    OpenMon,
    NarodMon,
    ThingSpeak,
}

impl MonitorId {
    pub const COUNT: usize = 8;

    pub const ALL: [MonitorId; Self::COUNT] = [
        MonitorId::Wifi,
        MonitorId::Internet,
        MonitorId::Transport,
        MonitorId::Broker1,
        MonitorId::Broker2,
        MonitorId::OpenMon,
        MonitorId::NarodMon,
        MonitorId::ThingSpeak,
    ];

    /// Monitors locked while the internet is unavailable.
    pub const INTERNET_DEPENDENTS: [MonitorId; 6] = [
        MonitorId::Transport,
        MonitorId::Broker1,
        MonitorId::Broker2,
        MonitorId::OpenMon,
        MonitorId::NarodMon,
        MonitorId::ThingSpeak,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            MonitorId::Wifi => 0,
            MonitorId::Internet => 1,
            MonitorId::Transport => 2,
            MonitorId::Broker1 => 3,
            MonitorId::Broker2 => 4,
            MonitorId::OpenMon => 5,
            MonitorId::NarodMon => 6,
            MonitorId::ThingSpeak => 7,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MonitorId::Wifi => "wifi",
            MonitorId::Internet => "inet",
            MonitorId::Transport => "mqtt",
            MonitorId::Broker1 => "mqtt1-ping",
            MonitorId::Broker2 => "mqtt2-ping",
            MonitorId::OpenMon => "openmon",
            MonitorId::NarodMon => "narodmon",
            MonitorId::ThingSpeak => "thingspeak",
        }
    }

    /// Human-readable subject used in alert text.
    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            MonitorId::Wifi => "WiFi network",
            MonitorId::Internet => "Internet access",
            MonitorId::Transport => "MQTT broker",
            MonitorId::Broker1 | MonitorId::Broker2 => "MQTT host",
            MonitorId::OpenMon | MonitorId::NarodMon | MonitorId::ThingSpeak => "Host",
        }
    }

    #[must_use]
    pub const fn kind(self) -> MonitorKind {
        match self {
            MonitorId::Wifi => MonitorKind::RecoveryOnly,
            _ => MonitorKind::Auto,
        }
    }

    /// Object label attached before any event supplies one.
    #[must_use]
    pub const fn default_object(self) -> Option<&'static str> {
        match self {
            MonitorId::OpenMon => Some("open-monitoring.online"),
            MonitorId::NarodMon => Some("narodmon.ru"),
            MonitorId::ThingSpeak => Some("thingspeak.com"),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(name))
    }
}

/// Why a monitor changed state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reason {
    #[default]
    Unspecified,
    ConnectionLost,
    ConnectFailed,
    /// Informational: the transport switched endpoints.
    EndpointSwitched {
        primary: bool,
    },
    /// HTTP status returned by a publish target.
    Http(u16),
    /// Platform error code.
    Code(i32),
}

impl Reason {
    /// Informational reasons never change monitor state.
    #[must_use]
    pub const fn is_notice(self) -> bool {
        matches!(self, Reason::EndpointSwitched { .. })
    }

    /// Short description of the reason, when one exists.
    #[must_use]
    pub const fn describe(self) -> Option<&'static str> {
        match self {
            Reason::Unspecified | Reason::Code(_) => None,
            Reason::ConnectionLost => Some("connection lost"),
            Reason::ConnectFailed => Some("connection failed"),
            Reason::EndpointSwitched { primary: true } => Some("switched to primary server"),
            Reason::EndpointSwitched { primary: false } => Some("switched to reserve server"),
            Reason::Http(status) => http_reason_phrase(status),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.describe()) {
            (Reason::Http(status), Some(text)) => write!(f, "HTTP {status} {text}"),
            (Reason::Http(status), None) => write!(f, "HTTP {status}"),
            (Reason::Code(code), _) => write!(f, "error {code:#06x}"),
            (_, Some(text)) => f.write_str(text),
            (_, None) => f.write_str("unknown"),
        }
    }
}

/// Reason phrase for the HTTP statuses publish targets commonly return.
#[must_use]
pub const fn http_reason_phrase(status: u16) -> Option<&'static str> {
    match status {
        300 => Some("Multiple Choices"),
        301 => Some("Moved Permanently"),
        302 => Some("Moved Temporarily"),
        307 => Some("Temporary Redirect"),
        308 => Some("Permanent Redirect"),
        400 => Some("Bad Request"),
        401 => Some("Unauthorized"),
        403 => Some("Forbidden"),
        404 => Some("Not Found"),
        429 => Some("Too Many Requests"),
        431 => Some("Request Header Fields Too Large"),
        500 => Some("Internal Server Error"),
        501 => Some("Not Implemented"),
        502 => Some("Bad Gateway"),
        503 => Some("Service Unavailable"),
        504 => Some("Gateway Timeout"),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnouncementKind {
    Failure,
    Recovery,
    Degraded,
    Notice,
}

/// Transition a monitor decided to announce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    pub monitor: MonitorId,
    pub kind: AnnouncementKind,
    pub reason: Reason,
    pub object: Option<Label>,
    /// Onset of the outage (or time of the event for notices).
    pub failed_at: Timestamp,
    pub at: Timestamp,
}

impl Announcement {
    /// Outage duration, for recoveries.
    #[must_use]
    pub fn outage(&self) -> Option<Duration> {
        match self.kind {
            AnnouncementKind::Recovery => Some(self.at.saturating_since(self.failed_at)),
            _ => None,
        }
    }
}

/// Failure/recovery bookkeeping for one subsystem.
#[derive(Clone, Debug)]
pub struct HealthMonitor {
    id: MonitorId,
    kind: MonitorKind,
    state: HealthState,
    reason: Reason,
    object: Option<Label>,
    failure_since: Option<Timestamp>,
    changed_at: Option<Timestamp>,
    threshold: Duration,
    enabled: bool,
    locked: bool,
    announce_degraded: bool,
    attributed: bool,
    forced: bool,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(id: MonitorId, threshold: Duration) -> Self {
        Self {
            id,
            kind: id.kind(),
            state: HealthState::Ok,
            reason: Reason::Unspecified,
            object: id.default_object().map(label),
            failure_since: None,
            changed_at: None,
            threshold,
            enabled: true,
            locked: false,
            announce_degraded: false,
            attributed: false,
            forced: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> MonitorId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> MonitorKind {
        self.kind
    }

    #[must_use]
    pub const fn state(&self) -> HealthState {
        self.state
    }

    #[must_use]
    pub const fn failure_since(&self) -> Option<Timestamp> {
        self.failure_since
    }

    #[must_use]
    pub const fn changed_at(&self) -> Option<Timestamp> {
        self.changed_at
    }

    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    /// Disabling only gates delivery; bookkeeping continues.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_threshold(&mut self, threshold: Duration) {
        self.threshold = threshold;
    }

    pub fn set_announce_degraded(&mut self, announce: bool) {
        self.announce_degraded = announce;
    }

    /// Records a transition to `state`.
    pub fn set_state(
        &mut self,
        state: HealthState,
        at: Timestamp,
        object: Option<&str>,
    ) -> Option<Announcement> {
        self.transition(state, Reason::Unspecified, at, object)
    }

    /// Records a transition carrying a discriminating reason. Informational
    /// reasons are announced without touching the state.
    pub fn send_extended(
        &mut self,
        state: HealthState,
        at: Timestamp,
        reason: Reason,
        object: Option<&str>,
    ) -> Option<Announcement> {
        if let Some(object) = object {
            self.object = Some(label(object));
        }

        if reason.is_notice() {
            return self
                .may_deliver()
                .then(|| self.announcement(AnnouncementKind::Notice, reason, at, at));
        }

        self.transition(state, reason, at, None)
    }

    /// Suppresses announcements until [`HealthMonitor::unlock`].
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Lifts the lock. A failure that began under the lock and is still
    /// active becomes this monitor's own outage, measured from `at`. Unlock
    /// announces nothing; the pending failure surfaces as a recovery once it
    /// clears after outlasting the threshold.
    pub fn unlock(&mut self, at: Timestamp) {
        if !self.locked {
            return;
        }

        self.locked = false;
        if self.state.is_failure() && self.attributed {
            self.attributed = false;
            self.failure_since = Some(at);
        }
    }

    /// Marks the current outage as significant regardless of its length.
    pub fn force_timeout(&mut self) {
        if self.state.is_failure() {
            self.forced = true;
        }
    }

    fn may_deliver(&self) -> bool {
        self.enabled && !self.locked
    }

    fn announcement(
        &self,
        kind: AnnouncementKind,
        reason: Reason,
        failed_at: Timestamp,
        at: Timestamp,
    ) -> Announcement {
        Announcement {
            monitor: self.id,
            kind,
            reason,
            object: self.object.clone(),
            failed_at,
            at,
        }
    }

    fn transition(
        &mut self,
        state: HealthState,
        reason: Reason,
        at: Timestamp,
        object: Option<&str>,
    ) -> Option<Announcement> {
        if let Some(object) = object {
            self.object = Some(label(object));
        }

        match (self.state, state) {
            (HealthState::Failure, HealthState::Failure) => {
                if self.failure_since.is_some_and(|since| at < since) {
                    self.failure_since = Some(at);
                }
                if reason != Reason::Unspecified {
                    self.reason = reason;
                }
                None
            }
            (_, HealthState::Failure) => {
                self.state = HealthState::Failure;
                self.changed_at = Some(at);
                self.failure_since = Some(at);
                self.reason = reason;
                self.attributed = self.locked;
                self.forced = false;

                (self.kind == MonitorKind::Auto && self.may_deliver())
                    .then(|| self.announcement(AnnouncementKind::Failure, reason, at, at))
            }
            (HealthState::Failure, next) => {
                let since = self.failure_since.take().unwrap_or(at);
                let significant = self.forced || at.saturating_since(since) >= self.threshold;
                let attributed = self.attributed;
                let reason = self.reason;
                self.state = next;
                self.changed_at = Some(at);
                self.attributed = false;
                self.forced = false;
                self.reason = Reason::Unspecified;

                (significant && !attributed && self.may_deliver())
                    .then(|| self.announcement(AnnouncementKind::Recovery, reason, since, at))
            }
            (HealthState::Ok, HealthState::Degraded) => {
                self.state = HealthState::Degraded;
                self.changed_at = Some(at);

                (self.announce_degraded && self.kind == MonitorKind::Auto && self.may_deliver())
                    .then(|| self.announcement(AnnouncementKind::Degraded, reason, at, at))
            }
            (HealthState::Degraded, HealthState::Ok) => {
                self.state = HealthState::Ok;
                self.changed_at = Some(at);
                None
            }
            _ => None,
        }
    }
}

/// The full set of monitors, indexed by [`MonitorId`].
#[derive(Clone, Debug)]
pub struct MonitorSet {
    monitors: [HealthMonitor; MonitorId::COUNT],
}

impl MonitorSet {
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            monitors: MonitorId::ALL.map(|id| HealthMonitor::new(id, threshold)),
        }
    }

    #[must_use]
    pub fn get(&self, id: MonitorId) -> &HealthMonitor {
        &self.monitors[id.index()]
    }

    pub fn get_mut(&mut self, id: MonitorId) -> &mut HealthMonitor {
        &mut self.monitors[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &HealthMonitor> {
        self.monitors.iter()
    }

    /// Applies the shared recovery threshold to every monitor.
    pub fn set_threshold(&mut self, threshold: Duration) {
        for monitor in &mut self.monitors {
            monitor.set_threshold(threshold);
        }
    }

    pub fn lock(&mut self, ids: &[MonitorId]) {
        for id in ids {
            self.get_mut(*id).lock();
        }
    }

    pub fn unlock(&mut self, ids: &[MonitorId], at: Timestamp) {
        for id in ids {
            self.get_mut(*id).unlock(at);
        }
    }
}
