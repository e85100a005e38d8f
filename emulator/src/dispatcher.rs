//! Host-side collaborators for the health service and the thread that runs it.
//!
//! The dispatcher owns the [`HealthService`] and drains [`Request`]s in
//! arrival order. Everything the service emits (alerts, indicator changes,
//! restarts) is rendered to text and sent back to the console over an output
//! channel.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use health_core::alert::{
    Alert, AlertChannel, AlertFormatter, AlertPriority, AlertSink, TimestampFormat,
};
use health_core::clock::{Clock, Timestamp};
use health_core::events::HealthEvent;
use health_core::indicator::{BlinkPattern, IndicatorCommand, IndicatorDriver, IndicatorObserver};
use health_core::ota::OtaPhase;
use health_core::registry::{CondvarFlagStore, Registries};
use health_core::service::{HealthService, Lifecycle};
use health_core::status::write_monitor_line;
use health_core::system::{BootCause, OutboundEvent, RestartReason, SystemControl};

/// Idle wait when the host clock drives timers and nothing is pending.
const IDLE_POLL: Duration = Duration::from_secs(1);

pub type EmulatorRegistries = Registries<CondvarFlagStore, IndicatorObserver<ConsoleIndicator>>;

pub type EmulatorService = HealthService<
    'static,
    CondvarFlagStore,
    IndicatorObserver<ConsoleIndicator>,
    HostClock,
    ConsoleSink,
    EmulatorSystem,
>;

/// Work items accepted by the dispatcher thread.
#[derive(Debug)]
pub enum Request {
    Event(HealthEvent),
    /// Moves the clock forward and fires any timer that came due.
    Advance(Duration),
    /// Replies once every earlier request has been handled.
    Flush(Sender<()>),
    Report(Sender<Report>),
    Shutdown,
}

/// Service internals that are not visible through the registries.
#[derive(Clone, Debug)]
pub struct Report {
    pub lifecycle: Lifecycle,
    pub uptime: Duration,
    pub monitors: Vec<String>,
    pub watchdog: Option<Duration>,
    pub ota: OtaPhase<Duration>,
    pub allocation_failures: u32,
}

struct ClockState {
    started: Instant,
    epoch: Option<u64>,
    offset_ms: AtomicU64,
}

/// Clock shared by the console and the dispatcher.
///
/// In virtual mode (an epoch is configured) time only moves on `advance`.
/// Otherwise it follows the host clock plus the accumulated offset.
#[derive(Clone)]
pub struct HostClock {
    state: Arc<ClockState>,
}

impl HostClock {
    pub fn new(epoch: Option<u64>) -> Self {
        Self {
            state: Arc::new(ClockState {
                started: Instant::now(),
                epoch,
                offset_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.state.epoch.is_some()
    }

    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.state.offset_ms.fetch_add(millis, Ordering::AcqRel);
    }

    fn offset(&self) -> Duration {
        Duration::from_millis(self.state.offset_ms.load(Ordering::Acquire))
    }
}

impl Clock for HostClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        if self.is_virtual() {
            self.offset()
        } else {
            self.state.started.elapsed() + self.offset()
        }
    }

    fn wall_time(&self) -> Timestamp {
        let base = self
            .state
            .epoch
            .unwrap_or_else(|| u64::try_from(Utc::now().timestamp()).unwrap_or_default());
        Timestamp::from_secs(base) + self.offset()
    }
}

/// Renders alert timestamps as `14.11.2023 22:13:20` (UTC).
#[derive(Clone, Copy, Debug, Default)]
pub struct CalendarTimestamps;

impl TimestampFormat for CalendarTimestamps {
    fn write_timestamp(&self, out: &mut dyn std::fmt::Write, at: Timestamp) -> std::fmt::Result {
        let parsed = i64::try_from(at.as_secs())
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        match parsed {
            Some(time) => write!(out, "{}", time.format("%d.%m.%Y %H:%M:%S")),
            None => write!(out, "@{}", at.as_secs()),
        }
    }
}

/// Alert sink that prints alerts to the console.
pub struct ConsoleSink {
    output: Sender<String>,
}

impl ConsoleSink {
    pub fn new(output: Sender<String>) -> Self {
        Self { output }
    }
}

impl AlertSink for ConsoleSink {
    type Error = io::Error;

    fn deliver(&mut self, alert: &Alert) -> Result<(), Self::Error> {
        let mut text = String::new();
        AlertFormatter::new(&CalendarTimestamps)
            .write_alert(&mut text, alert)
            .map_err(|_| io::Error::other("alert rendering failed"))?;
        let line = format!(
            "ALERT {}/{} {text}",
            channel_label(alert.channel),
            priority_label(alert.priority)
        );
        self.output
            .send(line)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "console closed"))
    }
}

fn channel_label(channel: AlertChannel) -> &'static str {
    match channel {
        AlertChannel::Main => "main",
        AlertChannel::Service => "service",
    }
}

fn priority_label(priority: AlertPriority) -> &'static str {
    match priority {
        AlertPriority::Low => "low",
        AlertPriority::Normal => "normal",
        AlertPriority::High => "high",
        AlertPriority::Critical => "critical",
    }
}

/// Indicator driver that prints pattern changes.
pub struct ConsoleIndicator {
    output: Mutex<Sender<String>>,
    last: Mutex<Option<IndicatorCommand>>,
}

impl ConsoleIndicator {
    pub fn new(output: Sender<String>) -> Self {
        Self {
            output: Mutex::new(output),
            last: Mutex::new(None),
        }
    }
}

impl IndicatorDriver for ConsoleIndicator {
    fn apply(&self, command: IndicatorCommand) {
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == Some(command) {
                return;
            }
            *last = Some(command);
        }

        let line = format!("LED {}", describe_indicator(command));
        let output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        if output.send(line).is_err() {
            log::debug!("indicator output dropped, console closed");
        }
    }
}

fn describe_indicator(command: IndicatorCommand) -> String {
    let pattern = |pattern: BlinkPattern| {
        format!(
            "{}x{}ms every {}ms",
            pattern.quantity, pattern.duration_ms, pattern.interval_ms
        )
    };
    match command {
        IndicatorCommand::On => "on".to_string(),
        IndicatorCommand::Off => "off".to_string(),
        IndicatorCommand::Flash(value) => format!("flash {}", pattern(value)),
        IndicatorCommand::Blink(value) => format!("blink {}", pattern(value)),
        IndicatorCommand::BlinkOff => "blink off".to_string(),
        IndicatorCommand::Enable(true) => "enabled".to_string(),
        IndicatorCommand::Enable(false) => "blanked".to_string(),
    }
}

/// Emulated platform: prints restarts and image operations instead of
/// performing them.
pub struct EmulatorSystem {
    boot: BootCause,
    version: String,
    output: Sender<String>,
}

impl EmulatorSystem {
    pub fn new(boot: BootCause, version: String, output: Sender<String>) -> Self {
        Self {
            boot,
            version,
            output,
        }
    }

    fn emit(&self, line: String) {
        if self.output.send(line).is_err() {
            log::debug!("system output dropped, console closed");
        }
    }
}

impl SystemControl for EmulatorSystem {
    fn boot_cause(&self) -> BootCause {
        self.boot
    }

    fn firmware_version(&self) -> &str {
        &self.version
    }

    fn restart(&mut self, reason: RestartReason) {
        log::warn!("restart requested: {}", reason.as_str());
        self.emit(format!(
            "SYSTEM restart ({}), next boot reports `{}`",
            reason.as_str(),
            reason.boot_cause()
        ));
    }

    fn mark_image_valid(&mut self) {
        self.emit("SYSTEM firmware image marked valid".to_string());
    }

    fn rollback_and_reboot(&mut self) {
        log::warn!("firmware image failed verification");
        self.emit("SYSTEM firmware image rolled back, rebooting".to_string());
    }

    fn post(&mut self, event: OutboundEvent) {
        let name = match event {
            OutboundEvent::ReachabilityConfirmed => "reachability-confirmed",
            OutboundEvent::ReachabilityLost => "reachability-lost",
            OutboundEvent::SystemStarted => "system-started",
        };
        self.emit(format!("POST {name}"));
    }
}

/// Starts the dispatcher thread.
pub fn spawn(service: EmulatorService, requests: Receiver<Request>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("health-dispatcher".to_string())
        .spawn(move || run(service, &requests))
}

fn run(mut service: EmulatorService, requests: &Receiver<Request>) {
    service.start();
    log::info!(
        "dispatcher running (boot: {})",
        service.system().boot_cause()
    );

    loop {
        let request = if service.clock().is_virtual() {
            requests.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            let wait = service.next_deadline().map_or(IDLE_POLL, |deadline| {
                deadline.saturating_sub(service.clock().now())
            });
            requests.recv_timeout(wait)
        };

        match request {
            Ok(Request::Event(event)) => {
                log::debug!("dispatching {event}");
                service.handle(event);
            }
            Ok(Request::Advance(by)) => {
                service.clock().advance(by);
                service.handle(HealthEvent::TimerElapsed);
            }
            Ok(Request::Flush(reply)) => {
                let _ = reply.send(());
            }
            Ok(Request::Report(reply)) => {
                let _ = reply.send(report(&service));
            }
            Err(RecvTimeoutError::Timeout) => service.handle(HealthEvent::TimerElapsed),
            Ok(Request::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    service.stop();
    log::info!("dispatcher stopped");
}

fn report(service: &EmulatorService) -> Report {
    let monitors = service
        .monitors()
        .iter()
        .map(|monitor| {
            let mut line = String::new();
            // Writing into a String cannot fail.
            let _ = write_monitor_line(&mut line, monitor);
            line
        })
        .collect();

    Report {
        lifecycle: service.lifecycle(),
        uptime: service.clock().now(),
        monitors,
        watchdog: service.watchdog_deadline(),
        ota: service.ota_phase(),
        allocation_failures: service.allocation_failures(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn virtual_clock_moves_only_on_advance() {
        let clock = HostClock::new(Some(1_700_000_000));
        assert_eq!(clock.now(), Duration::ZERO);
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), Duration::from_secs(90));
        assert_eq!(clock.wall_time(), Timestamp::from_secs(1_700_000_090));
    }

    #[test]
    fn calendar_timestamps_render_utc() {
        let mut text = String::new();
        CalendarTimestamps
            .write_timestamp(&mut text, Timestamp::from_secs(1_700_000_000))
            .expect("render");
        assert_eq!(text, "14.11.2023 22:13:20");
    }

    #[test]
    fn indicator_prints_only_changes() {
        let (sender, receiver) = mpsc::channel();
        let indicator = ConsoleIndicator::new(sender);
        indicator.apply(IndicatorCommand::Off);
        indicator.apply(IndicatorCommand::Off);
        indicator.apply(IndicatorCommand::Blink(BlinkPattern::new(2, 100, 1_000)));

        let lines: Vec<String> = receiver.try_iter().collect();
        assert_eq!(lines, ["LED off", "LED blink 2x100ms every 1000ms"]);
    }
}
