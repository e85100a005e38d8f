mod common;

use core::time::Duration;

use common::{
    Harness, bring_online, inet_up, link_down, link_up, rtc, transport_connected, transport_lost,
};
use health_core::clock::Timestamp;
use health_core::config::{HealthConfig, MonitorToggles};
use health_core::events::{
    Broker, Endpoint, HealthEvent, ProbeEvent, PublishTarget, ReachabilityEvent, SystemEvent,
    TimeEvent, TransportEvent, label,
};
use health_core::flags::{ErrorFlag, StateFlag};
use health_core::monitor::{Announcement, AnnouncementKind, HealthState, MonitorId, Reason};
use health_core::service::Lifecycle;
use health_core::system::{BootCause, OutboundEvent, RestartReason};

#[test]
fn link_loss_yields_one_root_cause_alert() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);

    harness.clock.at(100);
    service.handle(link_down());
    assert!(service.monitors().get(MonitorId::Internet).is_locked());
    assert!(service.monitors().get(MonitorId::Transport).is_locked());

    harness.clock.at(110);
    service.handle(transport_lost());
    harness.clock.at(120);
    service.handle(transport_connected());
    harness.clock.at(130);
    service.handle(transport_lost());

    harness.clock.at(500);
    service.handle(link_up());
    service.handle(inet_up());
    assert_eq!(
        service.monitors().get(MonitorId::Transport).failure_since(),
        Some(Timestamp::from_secs(500)),
        "an outage that outlives the lock is measured from the unlock"
    );

    harness.clock.at(520);
    service.handle(transport_connected());

    let announcements = service.alerts().announcements();
    assert_eq!(announcements.len(), 1, "{announcements:?}");
    assert_eq!(announcements[0].monitor, MonitorId::Wifi);
    assert_eq!(announcements[0].kind, AnnouncementKind::Recovery);
    assert_eq!(
        announcements[0].outage(),
        Some(Duration::from_secs(400))
    );
}

#[test]
fn started_fires_once_despite_flapping() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);

    for step in 1..=3 {
        harness.clock.at(step * 100);
        service.handle(link_down());
        service.handle(link_up());
        service.handle(inet_up());
        service.handle(transport_connected());
        service.handle(HealthEvent::System(SystemEvent::Started));
    }

    assert_eq!(service.system().started_posts(), 1);
}

#[test]
fn degraded_reachability_counts_as_available() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);

    service.handle(rtc());
    service.handle(link_up());
    service.handle(HealthEvent::Reachability(ReachabilityEvent::Slowdown));
    service.handle(transport_connected());

    assert_eq!(service.system().started_posts(), 1);
    assert_eq!(
        service.monitors().get(MonitorId::Internet).state(),
        HealthState::Degraded
    );
    assert!(harness.registries.states().check(StateFlag::InetSlowdown, false));
}

#[test]
fn watchdog_tracks_transport_expectation() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);
    assert_eq!(service.watchdog_deadline(), None);

    service.handle(transport_lost());
    assert_eq!(
        service.watchdog_deadline(),
        Some(Duration::from_secs(30 * 60))
    );

    harness.clock.at(60);
    service.handle(link_down());
    assert_eq!(
        service.watchdog_deadline(),
        None,
        "no restart while the link itself is down"
    );

    harness.clock.at(120);
    service.handle(link_up());
    service.handle(inet_up());
    let deadline = service.watchdog_deadline().expect("re-armed");
    assert_eq!(deadline, Duration::from_secs(120 + 30 * 60));

    harness.clock.at(deadline.as_secs() - 1);
    service.handle(HealthEvent::TimerElapsed);
    assert!(service.system().restarts.is_empty());

    harness.clock.at(deadline.as_secs());
    service.handle(HealthEvent::TimerElapsed);
    assert_eq!(service.system().restarts, [RestartReason::TransportTimeout]);
}

#[test]
fn disabled_watchdog_never_arms() {
    let harness = Harness::new();
    let config = HealthConfig {
        watchdog_minutes: 0,
        ..HealthConfig::DEFAULT
    };
    let mut service = harness.service(config, BootCause::PowerOn);
    bring_online(&mut service);
    service.handle(transport_lost());
    assert_eq!(service.watchdog_deadline(), None);
}

#[test]
fn allocation_failure_restarts_when_configured() {
    let harness = Harness::new();
    let config = HealthConfig {
        restart_on_alloc_failure: true,
        ..HealthConfig::DEFAULT
    };
    let mut service = harness.service(config, BootCause::PowerOn);

    service.handle(HealthEvent::System(SystemEvent::AllocationFailed {
        requested: 4_096,
    }));

    assert_eq!(service.allocation_failures(), 1);
    assert!(harness.registries.errors().check(ErrorFlag::Heap, false));
    assert_eq!(service.system().restarts, [RestartReason::AllocationFailed]);
}

#[test]
fn allocation_failure_is_only_counted_by_default() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);

    for _ in 0..3 {
        service.handle(HealthEvent::System(SystemEvent::AllocationFailed {
            requested: 64,
        }));
    }

    assert_eq!(service.allocation_failures(), 3);
    assert!(service.system().restarts.is_empty());
}

#[test]
fn silent_mode_alert_only_on_edges() {
    let harness = Harness::new();
    let mut config = HealthConfig::DEFAULT;
    config.notify.silent_mode = true;
    let mut service = harness.service(config, BootCause::PowerOn);

    service.handle(HealthEvent::Time(TimeEvent::SilentModeOn));
    service.handle(HealthEvent::Time(TimeEvent::SilentModeOn));
    service.handle(HealthEvent::Time(TimeEvent::SilentModeOff));

    assert_eq!(service.alerts().alerts.len(), 2);
}

#[test]
fn stopped_service_ignores_events() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    service.stop();
    assert_eq!(service.lifecycle(), Lifecycle::Stopped);

    service.handle(rtc());
    assert!(!harness.registries.states().check(StateFlag::RtcEnabled, false));
}

fn announcements_for(service: &common::TestService<'_>, id: MonitorId) -> Vec<Announcement> {
    service
        .alerts()
        .announcements()
        .into_iter()
        .filter(|announcement| announcement.monitor == id)
        .cloned()
        .collect()
}

fn publish_target(target: PublishTarget, active: bool, since: Option<u64>) -> HealthEvent {
    HealthEvent::System(SystemEvent::PublishTarget {
        target,
        active,
        since: since.map(Timestamp::from_secs),
        reason: if active { Reason::Http(503) } else { Reason::Unspecified },
    })
}

#[test]
fn late_reconnect_does_not_cancel_expired_watchdog() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);
    service.handle(transport_lost());

    harness.clock.at(30 * 60 + 5);
    service.handle(transport_connected());

    assert_eq!(service.system().restarts, [RestartReason::TransportTimeout]);
    assert_eq!(service.watchdog_deadline(), None);
}

#[test]
fn reachability_outage_start_carries_into_recovery() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);

    harness.clock.at(1_000);
    service.handle(HealthEvent::Reachability(ReachabilityEvent::Unavailable {
        since: Some(Timestamp::from_secs(900)),
    }));
    harness.clock.at(1_100);
    service.handle(inet_up());

    let recovery = announcements_for(&service, MonitorId::Internet)
        .into_iter()
        .find(|announcement| announcement.kind == AnnouncementKind::Recovery)
        .expect("internet recovery announced");
    assert_eq!(recovery.failed_at, Timestamp::from_secs(900));
    assert_eq!(recovery.outage(), Some(Duration::from_secs(200)));
}

#[test]
fn publish_target_failure_uses_reported_onset() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);

    harness.clock.at(300);
    service.handle(publish_target(PublishTarget::ThingSpeak, true, Some(100)));
    assert!(harness.registries.errors().check(ErrorFlag::ThingSpeak, false));

    harness.clock.at(400);
    service.handle(publish_target(PublishTarget::ThingSpeak, false, None));
    assert!(!harness.registries.errors().check(ErrorFlag::ThingSpeak, false));

    let announced = announcements_for(&service, MonitorId::ThingSpeak);
    assert_eq!(announced.len(), 2, "{announced:?}");
    assert_eq!(announced[0].kind, AnnouncementKind::Failure);
    assert_eq!(announced[0].reason, Reason::Http(503));
    assert_eq!(announced[1].kind, AnnouncementKind::Recovery);
    assert_eq!(announced[1].outage(), Some(Duration::from_secs(300)));
}

#[test]
fn site_target_only_raises_its_bit() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);

    service.handle(publish_target(PublishTarget::Site, true, None));
    assert!(harness.registries.errors().check(ErrorFlag::Site, false));
    assert!(service.alerts().announcements().is_empty());

    service.handle(publish_target(PublishTarget::Site, false, None));
    assert!(!harness.registries.errors().check(ErrorFlag::Site, false));
}

#[test]
fn link_implies_reachability_without_prober() {
    let harness = Harness::new();
    let config = HealthConfig {
        reachability_probe: false,
        ..HealthConfig::DEFAULT
    };
    let mut service = harness.service(config, BootCause::PowerOn);

    service.handle(rtc());
    service.handle(link_up());
    assert!(harness.registries.states().check(StateFlag::InetAvailable, false));
    service.handle(transport_connected());
    assert_eq!(service.system().started_posts(), 1);

    harness.clock.at(100);
    service.handle(link_down());
    assert!(service.monitors().get(MonitorId::Transport).is_locked());

    harness.clock.at(200);
    service.handle(link_up());
    for id in MonitorId::INTERNET_DEPENDENTS {
        assert!(!service.monitors().get(id).is_locked(), "{} unlocked", id.as_str());
    }
    let confirmations = service
        .system()
        .posted
        .iter()
        .filter(|event| **event == OutboundEvent::ReachabilityConfirmed)
        .count();
    assert_eq!(confirmations, 2);
}

#[test]
fn connect_failure_is_reported_apart_from_lost_connection() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);

    harness.clock.at(100);
    service.handle(HealthEvent::Transport(TransportEvent::ConnectFailed(
        common::broker(),
    )));
    harness.clock.at(110);
    service.handle(transport_connected());
    harness.clock.at(200);
    service.handle(transport_lost());

    let announced: Vec<(AnnouncementKind, Reason)> =
        announcements_for(&service, MonitorId::Transport)
            .iter()
            .map(|announcement| (announcement.kind, announcement.reason))
            .collect();
    assert_eq!(
        announced,
        [
            (AnnouncementKind::Failure, Reason::ConnectFailed),
            (AnnouncementKind::Recovery, Reason::ConnectFailed),
            (AnnouncementKind::Failure, Reason::ConnectionLost),
        ]
    );
}

#[test]
fn endpoint_switch_is_a_notice_only() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);

    service.handle(HealthEvent::Transport(TransportEvent::SecondarySelected(
        Endpoint::new("b2", 1883),
    )));
    assert!(!harness.registries.states().check(StateFlag::MqttPrimary, false));
    assert!(harness.registries.states().check(StateFlag::MqttConnected, false));
    assert_eq!(
        service.monitors().get(MonitorId::Transport).state(),
        HealthState::Ok
    );

    service.handle(HealthEvent::Transport(TransportEvent::PrimarySelected(
        common::broker(),
    )));
    assert!(harness.registries.states().check(StateFlag::MqttPrimary, false));

    let reasons: Vec<Reason> = announcements_for(&service, MonitorId::Transport)
        .iter()
        .inspect(|announcement| assert_eq!(announcement.kind, AnnouncementKind::Notice))
        .map(|announcement| announcement.reason)
        .collect();
    assert_eq!(
        reasons,
        [
            Reason::EndpointSwitched { primary: false },
            Reason::EndpointSwitched { primary: true },
        ]
    );
}

#[test]
fn broker_probes_toggle_their_flags() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);

    for broker in [Broker::First, Broker::Second] {
        service.handle(HealthEvent::Probe(ProbeEvent::Available {
            broker,
            host: label("b1"),
        }));
    }
    assert!(harness.registries.states().check(StateFlag::Mqtt1Enabled, false));
    assert!(harness.registries.states().check(StateFlag::Mqtt2Enabled, false));

    service.handle(HealthEvent::Probe(ProbeEvent::Unavailable {
        broker: Broker::Second,
        host: label("b2"),
        since: None,
    }));
    assert!(harness.registries.states().check(StateFlag::Mqtt1Enabled, false));
    assert!(!harness.registries.states().check(StateFlag::Mqtt2Enabled, false));
    assert_eq!(
        service.monitors().get(MonitorId::Broker2).state(),
        HealthState::Failure
    );
}

#[test]
fn monitor_enabled_mid_outage_announces_recovery() {
    let harness = Harness::new();
    let mut service = harness.service(HealthConfig::DEFAULT, BootCause::PowerOn);
    bring_online(&mut service);

    let muted = HealthConfig {
        monitors: MonitorToggles {
            transport: false,
            ..MonitorToggles::ALL_ENABLED
        },
        ..HealthConfig::DEFAULT
    };
    service.apply_config(muted).expect("valid configuration");

    harness.clock.at(100);
    service.handle(transport_lost());
    assert!(announcements_for(&service, MonitorId::Transport).is_empty());

    service
        .apply_config(HealthConfig::DEFAULT)
        .expect("valid configuration");
    harness.clock.at(300);
    service.handle(transport_connected());

    let announced = announcements_for(&service, MonitorId::Transport);
    assert_eq!(announced.len(), 1, "{announced:?}");
    assert_eq!(announced[0].kind, AnnouncementKind::Recovery);
    assert_eq!(announced[0].failed_at, Timestamp::from_secs(100));
}
