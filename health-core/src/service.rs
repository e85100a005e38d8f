//! The event router: one service object owning monitors and timers.
//!
//! [`HealthService`] is driven by a single dispatcher. Every inbound
//! [`HealthEvent`] is mapped onto registry mutations and monitor transitions,
//! after which the watchdog is reconciled against the new registry state and
//! both escalation timers are polled. Collaborators (clock, alert sink,
//! platform control) are injected at construction.
//!
//! Monitor dependencies form a fixed cascade:
//!
//! ```text
//! wifi -> inet -> { mqtt, mqtt1-ping, mqtt2-ping, openmon, narodmon, thingspeak }
//! ```
//!
//! A parent locks its children before recording its own failure and unlocks
//! them only after recording its recovery.

use crate::alert::{Alert, AlertSink};
use crate::clock::{Clock, Timestamp};
use crate::conditions::{self, Readiness};
use crate::config::{ConfigError, HealthConfig};
use crate::events::{
    Broker, Endpoint, HealthEvent, LinkEvent, NotifyChannel, ProbeEvent, PublishTarget,
    ReachabilityEvent, SensorEvent, SensorStatus, SystemEvent, TimeEvent, TransportEvent, label,
};
use crate::flags::{ErrorFlag, LINK_DEPENDENT, REACHABILITY, SENSOR_SLOTS, StateFlag, StateSet};
use crate::monitor::{Announcement, HealthState, MonitorId, MonitorSet, Reason};
use crate::ota::{OtaPhase, OtaVerifier};
use crate::registry::{ConsistencyError, FlagStore, Registries, RegistryObserver};
use crate::system::{OutboundEvent, RestartReason, StartupReport, SystemControl};
use crate::watchdog::RestartWatchdog;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Health state machine for the whole device.
pub struct HealthService<'r, S, O, C, A, X>
where
    C: Clock,
{
    registries: &'r Registries<S, O>,
    config: HealthConfig,
    monitors: MonitorSet,
    watchdog: RestartWatchdog<C::Instant>,
    ota: OtaVerifier<C::Instant>,
    clock: C,
    alerts: A,
    system: X,
    sensors: [SensorStatus; SENSOR_SLOTS as usize],
    allocation_failures: u32,
    lifecycle: Lifecycle,
}

impl<'r, S, O, C, A, X> HealthService<'r, S, O, C, A, X>
where
    S: FlagStore,
    O: RegistryObserver,
    C: Clock,
    A: AlertSink,
    X: SystemControl,
{
    /// Builds the service around shared registries.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(
        registries: &'r Registries<S, O>,
        config: HealthConfig,
        clock: C,
        alerts: A,
        system: X,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut service = Self {
            registries,
            config,
            monitors: MonitorSet::new(config.recovery_threshold()),
            watchdog: RestartWatchdog::from_minutes(config.watchdog_minutes),
            ota: OtaVerifier::new(config.ota_window()),
            clock,
            alerts,
            system,
            sensors: [SensorStatus::NotInitialized; SENSOR_SLOTS as usize],
            allocation_failures: 0,
            lifecycle: Lifecycle::Created,
        };
        service.apply_toggles();
        Ok(service)
    }

    /// Starts processing events. Safe to call more than once.
    pub fn start(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            log::debug!("health service already running");
            return;
        }

        let boot = self.system.boot_cause();
        log::info!(
            "health service starting (firmware {}, boot cause: {boot})",
            self.system.firmware_version()
        );
        self.lifecycle = Lifecycle::Running;
        self.ota.arm(boot, self.clock.now());
        self.check_started();
        self.reconcile_watchdog();
    }

    /// Stops processing events and cancels the watchdog. The OTA window keeps
    /// its state so a later `start` cannot re-open it.
    pub fn stop(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        self.watchdog.disarm();
        self.lifecycle = Lifecycle::Stopped;
        log::info!("health service stopped");
    }

    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub const fn config(&self) -> &HealthConfig {
        &self.config
    }

    #[must_use]
    pub const fn monitors(&self) -> &MonitorSet {
        &self.monitors
    }

    #[must_use]
    pub const fn registries(&self) -> &'r Registries<S, O> {
        self.registries
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn alerts(&self) -> &A {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut A {
        &mut self.alerts
    }

    pub fn system(&self) -> &X {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut X {
        &mut self.system
    }

    #[must_use]
    pub const fn allocation_failures(&self) -> u32 {
        self.allocation_failures
    }

    #[must_use]
    pub fn watchdog_deadline(&self) -> Option<C::Instant> {
        self.watchdog.deadline()
    }

    #[must_use]
    pub fn ota_phase(&self) -> OtaPhase<C::Instant> {
        self.ota.phase()
    }

    /// Earliest pending timer deadline; the dispatcher should deliver
    /// [`HealthEvent::TimerElapsed`] once it passes.
    #[must_use]
    pub fn next_deadline(&self) -> Option<C::Instant> {
        match (self.watchdog.deadline(), self.ota.deadline()) {
            (Some(left), Some(right)) => Some(left.min(right)),
            (left, right) => left.or(right),
        }
    }

    /// Replaces the configuration without touching monitor bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] and keeps the previous configuration when
    /// `config` fails validation.
    pub fn apply_config(&mut self, config: HealthConfig) -> Result<(), ConfigError> {
        config.validate()?;

        let watchdog_changed = config.watchdog_minutes != self.config.watchdog_minutes;
        self.config = config;
        self.apply_toggles();
        if watchdog_changed {
            self.watchdog
                .reconfigure(config.watchdog_minutes, self.clock.now());
            self.reconcile_watchdog();
        }
        log::info!("health configuration updated");
        Ok(())
    }

    /// Processes one event, then reconciles and polls the timers.
    ///
    /// Deadlines that passed before the event arrived fire first, so a late
    /// event never cancels an expiry the dispatcher has not yet delivered.
    pub fn handle(&mut self, event: HealthEvent) {
        if self.lifecycle != Lifecycle::Running {
            log::warn!("dropping {event}: health service not running");
            return;
        }

        self.poll_timers();
        log::debug!("event {event}");
        match event {
            HealthEvent::Link(event) => self.on_link(event),
            HealthEvent::Reachability(event) => self.on_reachability(event),
            HealthEvent::Transport(event) => self.on_transport(event),
            HealthEvent::Probe(event) => self.on_probe(event),
            HealthEvent::Time(event) => self.on_time(event),
            HealthEvent::Sensor(event) => self.on_sensor(event),
            HealthEvent::System(event) => self.on_system(event),
            HealthEvent::TimerElapsed => {}
        }

        self.reconcile_watchdog();
        self.poll_timers();
    }

    fn apply_toggles(&mut self) {
        let config = self.config;
        self.monitors.set_threshold(config.recovery_threshold());
        for id in MonitorId::ALL {
            self.monitors
                .get_mut(id)
                .set_enabled(config.monitors.enabled(id));
        }
        self.monitors
            .get_mut(MonitorId::Internet)
            .set_announce_degraded(config.notify.degraded);
    }

    fn states(&self) -> StateSet {
        self.registries.states().get()
    }

    fn wall_time(&self) -> Timestamp {
        self.clock.wall_time()
    }

    fn report(result: Result<(), ConsistencyError>) {
        if let Err(err) = result {
            log::error!("registry update failed: {err}");
        }
    }

    fn set_states(&self, mask: impl Into<StateSet>) {
        Self::report(self.registries.set_states(mask));
    }

    fn clear_states(&self, mask: impl Into<StateSet>) {
        Self::report(self.registries.clear_states(mask));
    }

    fn assign_states(&self, mask: impl Into<StateSet>, active: bool) {
        Self::report(self.registries.assign_states(mask, active));
    }

    fn assign_error(&self, flag: ErrorFlag, active: bool) {
        Self::report(self.registries.assign_errors(flag, active));
    }

    fn deliver(&mut self, alert: &Alert) {
        if let Err(err) = self.alerts.deliver(alert) {
            log::warn!("alert delivery failed: {err:?}");
        }
    }

    fn announce(&mut self, announcement: Option<Announcement>) {
        if let Some(announcement) = announcement {
            log::info!(
                "{} {:?} ({})",
                announcement.monitor.as_str(),
                announcement.kind,
                announcement.reason
            );
            self.deliver(&Alert::monitor(announcement));
        }
    }

    fn transition(
        &mut self,
        id: MonitorId,
        state: HealthState,
        at: Timestamp,
        object: Option<&str>,
    ) {
        let announcement = self.monitors.get_mut(id).set_state(state, at, object);
        self.announce(announcement);
    }

    fn transition_with(
        &mut self,
        id: MonitorId,
        state: HealthState,
        at: Timestamp,
        reason: Reason,
        object: Option<&str>,
    ) {
        let announcement = self
            .monitors
            .get_mut(id)
            .send_extended(state, at, reason, object);
        self.announce(announcement);
    }

    fn internet_recovered(&mut self, state: HealthState) {
        let now = self.wall_time();
        self.transition(MonitorId::Internet, state, now, None);
        self.monitors.unlock(&MonitorId::INTERNET_DEPENDENTS, now);
    }

    fn internet_lost(&mut self, since: Timestamp) {
        self.monitors.lock(&MonitorId::INTERNET_DEPENDENTS);
        self.transition(MonitorId::Internet, HealthState::Failure, since, None);
    }

    fn on_link(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Init => {
                self.clear_states(LINK_DEPENDENT.with(StateFlag::WifiStarted));
            }
            LinkEvent::Started => {
                self.set_states(StateFlag::WifiStarted);
                self.clear_states(LINK_DEPENDENT);
            }
            LinkEvent::GotAddress { access_point } => {
                self.set_states(StateFlag::WifiConnected);
                self.clear_states(REACHABILITY);

                let now = self.wall_time();
                self.transition(
                    MonitorId::Wifi,
                    HealthState::Ok,
                    now,
                    access_point.as_deref(),
                );
                self.monitors.unlock(&[MonitorId::Internet], now);

                if !self.config.reachability_probe {
                    self.set_states(StateFlag::InetAvailable);
                    self.system.post(OutboundEvent::ReachabilityConfirmed);
                    self.internet_recovered(HealthState::Ok);
                }
                self.check_started();
            }
            LinkEvent::Disconnected => self.link_lost(false),
            LinkEvent::Stopped => self.link_lost(true),
        }
    }

    fn link_lost(&mut self, stopped: bool) {
        let states = self.states();
        let was_connected = conditions::link_connected(states);
        let was_reachable = states.has(StateFlag::InetAvailable);

        let cleared = if stopped {
            LINK_DEPENDENT.with(StateFlag::WifiStarted)
        } else {
            LINK_DEPENDENT
        };
        self.clear_states(cleared);

        if was_reachable {
            self.system.post(OutboundEvent::ReachabilityLost);
        }
        if was_connected {
            let now = self.wall_time();
            self.monitors.lock(&[MonitorId::Internet]);
            self.internet_lost(now);
            self.transition(MonitorId::Wifi, HealthState::Failure, now, None);
        }
    }

    fn on_reachability(&mut self, event: ReachabilityEvent) {
        match event {
            ReachabilityEvent::Available => self.reachable(false),
            ReachabilityEvent::Slowdown => self.reachable(true),
            ReachabilityEvent::Unavailable { since } => {
                let states = self.states();
                self.clear_states(REACHABILITY);
                if states.has(StateFlag::InetAvailable) {
                    self.system.post(OutboundEvent::ReachabilityLost);
                }
                if conditions::link_connected(states) {
                    let since = since.unwrap_or_else(|| self.wall_time());
                    self.internet_lost(since);
                }
            }
        }
    }

    /// Degraded reachability still counts as available.
    fn reachable(&mut self, degraded: bool) {
        let states = self.states();
        self.set_states(StateFlag::InetAvailable);
        self.assign_states(StateFlag::InetSlowdown, degraded);

        if !states.has(StateFlag::InetAvailable) {
            self.system.post(OutboundEvent::ReachabilityConfirmed);
        }
        if conditions::link_connected(states) {
            let state = if degraded {
                HealthState::Degraded
            } else {
                HealthState::Ok
            };
            self.internet_recovered(state);
        }
        self.check_started();
    }

    fn on_transport(&mut self, event: TransportEvent) {
        let now = self.wall_time();
        match event {
            TransportEvent::Connected {
                endpoint,
                primary,
                local,
            } => {
                self.set_states(StateFlag::MqttConnected);
                self.assign_states(StateFlag::MqttPrimary, primary);
                self.assign_states(StateFlag::MqttLocal, local);
                self.transition(
                    MonitorId::Transport,
                    HealthState::Ok,
                    now,
                    Some(endpoint.label().as_str()),
                );
                self.check_started();
            }
            TransportEvent::Lost(endpoint) => {
                self.clear_states(StateFlag::MqttConnected);
                self.transition_with(
                    MonitorId::Transport,
                    HealthState::Failure,
                    now,
                    Reason::ConnectionLost,
                    Some(endpoint.label().as_str()),
                );
            }
            TransportEvent::ConnectFailed(endpoint) => {
                self.clear_states(StateFlag::MqttConnected);
                self.transition_with(
                    MonitorId::Transport,
                    HealthState::Failure,
                    now,
                    Reason::ConnectFailed,
                    Some(endpoint.label().as_str()),
                );
                self.monitors.get_mut(MonitorId::Transport).force_timeout();
            }
            TransportEvent::PrimarySelected(endpoint) => {
                self.endpoint_switched(&endpoint, true, now);
            }
            TransportEvent::SecondarySelected(endpoint) => {
                self.endpoint_switched(&endpoint, false, now);
            }
            TransportEvent::ProtocolError(message) => {
                log::warn!("transport protocol error: {message}");
                self.assign_error(ErrorFlag::Mqtt, true);
                if self.config.notify.transport_errors {
                    self.deliver(&Alert::transport_error(message));
                }
            }
            TransportEvent::ProtocolErrorCleared => {
                self.assign_error(ErrorFlag::Mqtt, false);
            }
        }
    }

    fn endpoint_switched(&mut self, endpoint: &Endpoint, primary: bool, at: Timestamp) {
        self.assign_states(StateFlag::MqttPrimary, primary);
        let state = self.monitors.get(MonitorId::Transport).state();
        self.transition_with(
            MonitorId::Transport,
            state,
            at,
            Reason::EndpointSwitched { primary },
            Some(endpoint.label().as_str()),
        );
    }

    fn on_probe(&mut self, event: ProbeEvent) {
        let (broker, available, host, at) = match event {
            ProbeEvent::Available { broker, host } => (broker, true, host, self.wall_time()),
            ProbeEvent::Unavailable {
                broker,
                host,
                since,
            } => {
                let at = since.unwrap_or_else(|| self.wall_time());
                (broker, false, host, at)
            }
        };

        let (flag, id) = match broker {
            Broker::First => (StateFlag::Mqtt1Enabled, MonitorId::Broker1),
            Broker::Second => (StateFlag::Mqtt2Enabled, MonitorId::Broker2),
        };
        self.assign_states(flag, available);

        let state = if available {
            HealthState::Ok
        } else {
            HealthState::Failure
        };
        self.transition(id, state, at, Some(host.as_str()));
    }

    fn on_time(&mut self, event: TimeEvent) {
        match event {
            TimeEvent::RtcAvailable => {
                self.set_states(StateFlag::RtcEnabled);
                self.check_started();
            }
            TimeEvent::SyncConfirmed => {
                self.set_states(StateFlag::SntpSynced);
                self.check_started();
            }
            TimeEvent::SilentModeOn | TimeEvent::SilentModeOff => {
                let enabled = event == TimeEvent::SilentModeOn;
                if self.states().has(StateFlag::SilentMode) == enabled {
                    return;
                }
                self.assign_states(StateFlag::SilentMode, enabled);
                log::info!("silent mode {}", if enabled { "on" } else { "off" });
                if self.config.notify.silent_mode {
                    self.deliver(&Alert::silent_mode(enabled));
                }
            }
            TimeEvent::MinuteTick => self.check_started(),
        }
    }

    fn on_sensor(&mut self, event: SensorEvent) {
        let SensorEvent { id, status, name } = event;
        // Out-of-range ids share a bit but are not tracked, so every report
        // counts as a change.
        let previous = (id < SENSOR_SLOTS)
            .then(|| core::mem::replace(&mut self.sensors[usize::from(id)], status));
        if previous == Some(status) {
            return;
        }

        self.assign_error(ErrorFlag::sensor(id), status.is_fault());
        log::info!("sensor {name} ({id}): {}", status.as_str());
        if self.config.notify.sensors {
            self.deliver(&Alert::sensor(name, status));
        }
    }

    fn on_system(&mut self, event: SystemEvent) {
        match event {
            SystemEvent::OtaStarted => self.set_states(StateFlag::Ota),
            SystemEvent::OtaCleared => self.clear_states(StateFlag::Ota),
            SystemEvent::GeneralError { active } => self.assign_error(ErrorFlag::General, active),
            SystemEvent::ChannelError { channel, active } => {
                let flag = match channel {
                    NotifyChannel::Telegram => ErrorFlag::Telegram,
                    NotifyChannel::Smtp => ErrorFlag::Smtp,
                };
                self.assign_error(flag, active);
            }
            SystemEvent::PublishTarget {
                target,
                active,
                since,
                reason,
            } => self.on_publish_target(target, active, since, reason),
            SystemEvent::AllocationFailed { requested } => {
                self.allocation_failures = self.allocation_failures.saturating_add(1);
                log::error!(
                    "allocation of {requested} bytes failed ({} so far)",
                    self.allocation_failures
                );
                self.assign_error(ErrorFlag::Heap, true);
                if self.config.restart_on_alloc_failure {
                    self.system.restart(RestartReason::AllocationFailed);
                }
            }
            SystemEvent::Started => self.confirm_image(),
        }
    }

    fn on_publish_target(
        &mut self,
        target: PublishTarget,
        active: bool,
        since: Option<Timestamp>,
        reason: Reason,
    ) {
        let (flag, monitor) = match target {
            PublishTarget::Site => (ErrorFlag::Site, None),
            PublishTarget::ThingSpeak => (ErrorFlag::ThingSpeak, Some(MonitorId::ThingSpeak)),
            PublishTarget::OpenMon => (ErrorFlag::OpenMon, Some(MonitorId::OpenMon)),
            PublishTarget::NarodMon => (ErrorFlag::NarodMon, Some(MonitorId::NarodMon)),
        };
        self.assign_error(flag, active);

        let Some(id) = monitor else {
            return;
        };
        if active {
            let at = since.unwrap_or_else(|| self.wall_time());
            self.transition_with(id, HealthState::Failure, at, reason, None);
        } else {
            let now = self.wall_time();
            self.transition(id, HealthState::Ok, now, None);
        }
    }

    fn confirm_image(&mut self) {
        if self.ota.confirm() {
            self.system.mark_image_valid();
        }
    }

    /// Fires the one-time started edge once every prerequisite holds.
    fn check_started(&mut self) {
        let states = self.states();
        if conditions::system_started(states) {
            return;
        }

        let readiness = Readiness::of(states);
        if !readiness.all() {
            log::debug!(
                "not started yet: time={} link={} inet={} mqtt={}",
                readiness.time,
                readiness.link,
                readiness.internet,
                readiness.transport
            );
            return;
        }

        self.set_states(StateFlag::Started);
        log::info!("system started");
        self.system.post(OutboundEvent::SystemStarted);
        self.confirm_image();

        if self.config.notify.startup {
            let report = StartupReport {
                version: label(self.system.firmware_version()),
                boot: self.system.boot_cause(),
                heap: self.system.heap_stats(),
                allocation_failures: self.allocation_failures,
            };
            self.deliver(&Alert::startup(report));
        }
    }

    /// Arms the watchdog only while the transport is down for no known
    /// upstream reason.
    fn reconcile_watchdog(&mut self) {
        let states = self.states();
        if conditions::transport_connected(states) || !conditions::transport_expected(states) {
            self.watchdog.disarm();
        } else {
            self.watchdog.arm(self.clock.now());
        }
    }

    fn poll_timers(&mut self) {
        let now = self.clock.now();
        if let Some(reason) = self.watchdog.poll(now) {
            log::error!("restarting: {}", reason.as_str());
            self.system.restart(reason);
        }
        if self.ota.poll(now) {
            self.system.rollback_and_reboot();
        }
    }
}
