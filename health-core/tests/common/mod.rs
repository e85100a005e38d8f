#![allow(dead_code)]

use core::cell::Cell;
use core::convert::Infallible;
use core::time::Duration;

use health_core::alert::{Alert, AlertBody, AlertSink};
use health_core::clock::{Clock, Timestamp};
use health_core::config::HealthConfig;
use health_core::events::{
    Endpoint, HealthEvent, LinkEvent, ReachabilityEvent, TimeEvent, TransportEvent,
};
use health_core::monitor::{Announcement, AnnouncementKind, MonitorId};
use health_core::registry::{AtomicFlagStore, NoopObserver, Registries};
use health_core::service::HealthService;
use health_core::system::{BootCause, OutboundEvent, RestartReason, SystemControl};

/// Manually advanced clock; wall time tracks the monotonic seconds.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Cell<Duration>,
}

impl MockClock {
    pub fn at(&self, secs: u64) {
        self.now.set(Duration::from_secs(secs));
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for MockClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.now.get()
    }

    fn wall_time(&self) -> Timestamp {
        Timestamp::from_secs(self.now.get().as_secs())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub alerts: Vec<Alert>,
}

impl RecordingSink {
    pub fn announcements(&self) -> Vec<&Announcement> {
        self.alerts
            .iter()
            .filter_map(|alert| match &alert.body {
                AlertBody::Monitor(announcement) => Some(announcement),
                _ => None,
            })
            .collect()
    }

    pub fn announced(&self, monitor: MonitorId, kind: AnnouncementKind) -> usize {
        self.announcements()
            .iter()
            .filter(|announcement| announcement.monitor == monitor && announcement.kind == kind)
            .count()
    }
}

impl AlertSink for RecordingSink {
    type Error = Infallible;

    fn deliver(&mut self, alert: &Alert) -> Result<(), Self::Error> {
        self.alerts.push(alert.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordingSystem {
    pub boot: BootCause,
    pub posted: Vec<OutboundEvent>,
    pub restarts: Vec<RestartReason>,
    pub images_marked_valid: u32,
    pub rollbacks: u32,
}

impl RecordingSystem {
    pub fn booted(boot: BootCause) -> Self {
        Self {
            boot,
            posted: Vec::new(),
            restarts: Vec::new(),
            images_marked_valid: 0,
            rollbacks: 0,
        }
    }

    pub fn started_posts(&self) -> usize {
        self.posted
            .iter()
            .filter(|event| **event == OutboundEvent::SystemStarted)
            .count()
    }
}

impl SystemControl for RecordingSystem {
    fn boot_cause(&self) -> BootCause {
        self.boot
    }

    fn firmware_version(&self) -> &str {
        "1.4.2"
    }

    fn restart(&mut self, reason: RestartReason) {
        self.restarts.push(reason);
    }

    fn mark_image_valid(&mut self) {
        self.images_marked_valid += 1;
    }

    fn rollback_and_reboot(&mut self) {
        self.rollbacks += 1;
    }

    fn post(&mut self, event: OutboundEvent) {
        self.posted.push(event);
    }
}

pub type TestService<'a> =
    HealthService<'a, AtomicFlagStore, NoopObserver, &'a MockClock, RecordingSink, RecordingSystem>;

pub struct Harness {
    pub clock: MockClock,
    pub registries: Registries,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            clock: MockClock::default(),
            registries: Registries::new(NoopObserver),
        }
    }

    pub fn service(&self, config: HealthConfig, boot: BootCause) -> TestService<'_> {
        let mut service = HealthService::new(
            &self.registries,
            config,
            &self.clock,
            RecordingSink::default(),
            RecordingSystem::booted(boot),
        )
        .expect("valid configuration");
        service.start();
        service
    }
}

pub fn broker() -> Endpoint {
    Endpoint::new("b1", 1883)
}

pub fn link_up() -> HealthEvent {
    HealthEvent::Link(LinkEvent::GotAddress { access_point: None })
}

pub fn link_down() -> HealthEvent {
    HealthEvent::Link(LinkEvent::Disconnected)
}

pub fn inet_up() -> HealthEvent {
    HealthEvent::Reachability(ReachabilityEvent::Available)
}

pub fn inet_down() -> HealthEvent {
    HealthEvent::Reachability(ReachabilityEvent::Unavailable { since: None })
}

pub fn rtc() -> HealthEvent {
    HealthEvent::Time(TimeEvent::RtcAvailable)
}

pub fn transport_connected() -> HealthEvent {
    HealthEvent::Transport(TransportEvent::Connected {
        endpoint: broker(),
        primary: true,
        local: false,
    })
}

pub fn transport_lost() -> HealthEvent {
    HealthEvent::Transport(TransportEvent::Lost(broker()))
}

/// Drives the service to the started milestone.
pub fn bring_online(service: &mut TestService<'_>) {
    for event in [rtc(), link_up(), inet_up(), transport_connected()] {
        service.handle(event);
    }
}
