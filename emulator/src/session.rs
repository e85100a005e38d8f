use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant as HostInstant};

use health_core::clock::Clock;
use health_core::events::HealthEvent;
use health_core::indicator::IndicatorObserver;
use health_core::ota::OtaPhase;
use health_core::queue::{EnqueueError, EventQueueProducer};
use health_core::registry::{CondvarFlagStore, Registries, WaitOptions};
use health_core::repl::HELP_TOPICS;
use health_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use health_core::repl::grammar::{StatusFormat, WaitCommand};
use health_core::service::HealthService;
use health_core::status::{StatusFormatter, StatusSnapshot};

use crate::config::EmulatorConfig;
use crate::dispatcher::{
    self, ConsoleIndicator, ConsoleSink, EmulatorRegistries, EmulatorSystem, HostClock, Report,
    Request,
};

/// Longest time the console waits for the dispatcher to catch up.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    BringUp,
    Outage,
    Ota,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::BringUp => "transcripts/emulator-bring-up.log",
            TranscriptProfile::Outage => "transcripts/emulator-outage.log",
            TranscriptProfile::Ota => "transcripts/emulator-ota.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::BringUp => "Health emulator bring-up transcript",
            TranscriptProfile::Outage => "Health emulator transport outage transcript",
            TranscriptProfile::Ota => "Health emulator OTA verification transcript",
        }
    }
}

pub struct Session {
    executor: CommandExecutor<HostQueue>,
    registries: &'static EmulatorRegistries,
    clock: HostClock,
    outputs: Receiver<String>,
    dispatcher: Option<JoinHandle<()>>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    pub fn new(config: &EmulatorConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let (output_tx, outputs) = mpsc::channel();
        let indicator = ConsoleIndicator::new(output_tx.clone());
        // The dispatcher borrows the registries for the rest of the process.
        let registries: &'static EmulatorRegistries = Box::leak(Box::new(Registries::with_stores(
            CondvarFlagStore::new(),
            CondvarFlagStore::new(),
            IndicatorObserver::new(indicator, config.health.indicator, config.health.offline),
        )));

        let clock = HostClock::new(config.epoch);
        let service = HealthService::new(
            registries,
            config.health,
            clock.clone(),
            ConsoleSink::new(output_tx.clone()),
            EmulatorSystem::new(config.boot, config.firmware_version.clone(), output_tx),
        )?;

        let (sender, requests) = mpsc::sync_channel(config.queue_depth);
        let dispatcher = dispatcher::spawn(service, requests)?;

        let mut session = Self {
            executor: CommandExecutor::new(HostQueue::new(sender, config.queue_depth)),
            registries,
            clock,
            outputs,
            dispatcher: Some(dispatcher),
            transcript: None,
            started_at: HostInstant::now(),
        };
        session.flush()?;
        Ok(session)
    }

    /// Records every exchange of this session to the profile's transcript.
    pub fn record(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        self.transcript = Some(TranscriptLogger::new(profile)?);
        Ok(())
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.append_transcript(elapsed, TranscriptRole::Host, trimmed)?;

        let lines = match self.executor.execute(trimmed) {
            Ok(CommandOutcome::Queued(event)) => self.handle_event(&event)?,
            Ok(CommandOutcome::Advance(by)) => self.handle_advance(by)?,
            Ok(CommandOutcome::Wait(wait)) => self.handle_wait(&wait),
            Ok(CommandOutcome::Status(format)) => self.handle_status(format)?,
            Ok(CommandOutcome::Help(topic)) => handle_help(topic),
            Err(CommandError::Parse(err)) => vec![format!("ERR syntax {err}")],
            Err(err @ CommandError::Enqueue(_)) => vec![format!("ERR queue {err}")],
        };

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    fn handle_event(&self, event: &HealthEvent) -> io::Result<Vec<String>> {
        let mut lines = vec![format!("OK {event}")];
        self.flush()?;
        lines.extend(self.drain_outputs());
        Ok(lines)
    }

    fn handle_advance(&self, by: Duration) -> io::Result<Vec<String>> {
        self.executor.queue().request(Request::Advance(by))?;
        self.flush()?;

        let mut lines = vec![format!(
            "OK advanced {} (uptime {})",
            format_duration_short(by),
            format_duration_short(self.clock.now())
        )];
        lines.extend(self.drain_outputs());
        Ok(lines)
    }

    fn handle_wait(&self, wait: &WaitCommand) -> Vec<String> {
        let mut options = if wait.all {
            WaitOptions::all()
        } else {
            WaitOptions::any()
        };
        if wait.clear {
            options = options.clearing();
        }

        let observed = self
            .registries
            .states()
            .wait_for(wait.flags, options, Some(wait.timeout));
        let mut lines = if options.satisfied(observed.bits(), wait.flags.bits()) {
            vec![format!("OK wait {observed}")]
        } else {
            vec![format!("TIMEOUT wait observed {observed}")]
        };
        lines.extend(self.drain_outputs());
        lines
    }

    fn handle_status(&self, format: StatusFormat) -> io::Result<Vec<String>> {
        let snapshot = self.registries.snapshot();
        match format {
            StatusFormat::Json => {
                let json = serde_json::to_string(&StatusSnapshot::from(snapshot))
                    .map_err(io::Error::other)?;
                Ok(vec![json])
            }
            StatusFormat::Text => {
                let formatter = StatusFormatter::new(&snapshot);
                let mut states = String::new();
                let mut errors = String::new();
                let mut readiness = String::new();
                formatter
                    .write_states_line(&mut states)
                    .and_then(|()| formatter.write_errors_line(&mut errors))
                    .and_then(|()| formatter.write_readiness_line(&mut readiness))
                    .map_err(io::Error::other)?;
                let mut lines = vec![states, errors, readiness];

                let report = self.report()?;
                lines.extend(report.monitors.iter().cloned());
                lines.push(describe_watchdog(&report));
                lines.push(describe_ota(report.ota, report.uptime));
                lines.push(format!(
                    "service {:?} uptime {} allocation_failures={}",
                    report.lifecycle,
                    format_duration_short(report.uptime),
                    report.allocation_failures
                ));
                Ok(lines)
            }
        }
    }

    fn report(&self) -> io::Result<Report> {
        let (reply, response) = mpsc::channel();
        self.executor.queue().request(Request::Report(reply))?;
        response
            .recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dispatcher did not report"))
    }

    /// Blocks until the dispatcher has handled every queued request.
    fn flush(&self) -> io::Result<()> {
        let (reply, done) = mpsc::channel();
        self.executor.queue().request(Request::Flush(reply))?;
        done.recv_timeout(REPLY_TIMEOUT)
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dispatcher did not respond"))
    }

    fn drain_outputs(&self) -> Vec<String> {
        self.outputs.try_iter().collect()
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.append_transcript(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }

    fn append_transcript(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.executor.queue().request(Request::Shutdown).is_err() {
            log::debug!("dispatcher already gone");
        }
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                log::error!("dispatcher thread panicked");
            }
        }
    }
}

fn handle_help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) if !target.is_empty() => {
            if let Some(detail) = health_core::repl::help_for(target) {
                lines.push(detail.to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        _ => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

/// Bounded producer feeding the dispatcher thread.
struct HostQueue {
    sender: SyncSender<Request>,
    capacity: usize,
}

impl HostQueue {
    fn new(sender: SyncSender<Request>, capacity: usize) -> Self {
        Self { sender, capacity }
    }

    /// Sends a control request, waiting for room in the queue.
    fn request(&self, request: Request) -> io::Result<()> {
        self.sender
            .send(request)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "dispatcher is not running"))
    }
}

impl EventQueueProducer for HostQueue {
    type Error = ();

    fn try_enqueue(&mut self, event: HealthEvent) -> Result<(), EnqueueError<Self::Error>> {
        match self.sender.try_send(Request::Event(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EnqueueError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(EnqueueError::Disconnected),
        }
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_topic_list() -> String {
    let mut buffer = String::new();
    for (index, (name, _)) in HELP_TOPICS.iter().enumerate() {
        if index > 0 {
            buffer.push_str(", ");
        }
        buffer.push_str(name);
    }
    buffer
}

fn describe_watchdog(report: &Report) -> String {
    match report.watchdog {
        Some(deadline) => format!(
            "watchdog armed, restart in {}",
            format_duration_short(deadline.saturating_sub(report.uptime))
        ),
        None => "watchdog idle".to_string(),
    }
}

fn describe_ota(phase: OtaPhase<Duration>, uptime: Duration) -> String {
    match phase {
        OtaPhase::Inactive => "ota inactive".to_string(),
        OtaPhase::Armed { deadline } => format!(
            "ota verifying, rollback in {}",
            format_duration_short(deadline.saturating_sub(uptime))
        ),
        OtaPhase::Verified => "ota verified".to_string(),
        OtaPhase::RolledBack => "ota rolled back".to_string(),
    }
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_core::system::BootCause;

    const EPOCH: u64 = 1_700_000_000;

    fn session_with(config: EmulatorConfig) -> Session {
        let _ = env_logger::builder().is_test(true).try_init();
        Session::new(&config).expect("session starts")
    }

    fn session() -> Session {
        session_with(EmulatorConfig {
            epoch: Some(EPOCH),
            ..EmulatorConfig::default()
        })
    }

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("command handled")
    }

    fn bring_up(session: &mut Session) -> Vec<String> {
        let mut lines = Vec::new();
        for line in ["time rtc", "link up", "inet up", "mqtt connect b1 1883"] {
            lines.extend(run(session, line));
        }
        lines
    }

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn bring_up_reports_started_once() {
        let mut session = session();
        let lines = bring_up(&mut session);

        assert_eq!(
            lines.iter().filter(|line| *line == "POST system-started").count(),
            1,
            "{lines:#?}"
        );
        assert!(contains(&lines, "ALERT service/normal Device started"), "{lines:#?}");

        let status = run(&mut session, "status json");
        let value: serde_json::Value = serde_json::from_str(&status[0]).expect("valid json");
        assert_eq!(value["states"]["mqtt_connected"], 1);
        assert_eq!(value["states"]["inet_availabled"], 1);
        assert_eq!(value["errors"]["mqtt"], 0);
    }

    #[test]
    fn transport_outage_reports_calendar_duration() {
        let mut session = session();
        bring_up(&mut session);

        let lost = run(&mut session, "mqtt lost b1 1883");
        assert!(
            contains(
                &lost,
                "MQTT broker b1:1883 unavailable since 14.11.2023 22:13:20"
            ),
            "{lost:#?}"
        );

        run(&mut session, "advance 2m");
        let back = run(&mut session, "mqtt connect b1 1883");
        assert!(
            contains(
                &back,
                "MQTT broker b1:1883 available again, outage from 14.11.2023 22:13:20 \
                 to 14.11.2023 22:15:20, duration 0h 2m 0s"
            ),
            "{back:#?}"
        );
    }

    #[test]
    fn watchdog_restarts_after_advance() {
        let mut session = session();
        bring_up(&mut session);
        run(&mut session, "mqtt lost b1 1883");

        let status = run(&mut session, "status");
        assert!(contains(&status, "watchdog armed, restart in 1800s"), "{status:#?}");

        let lines = run(&mut session, "advance 30m");
        assert!(contains(&lines, "SYSTEM restart (transport timeout)"), "{lines:#?}");
    }

    #[test]
    fn ota_boot_confirms_image_on_start() {
        let mut session = session_with(EmulatorConfig {
            epoch: Some(EPOCH),
            boot: BootCause::Ota,
            ..EmulatorConfig::default()
        });

        let status = run(&mut session, "status");
        assert!(contains(&status, "ota verifying"), "{status:#?}");

        let lines = bring_up(&mut session);
        assert!(contains(&lines, "SYSTEM firmware image marked valid"), "{lines:#?}");
    }

    #[test]
    fn wait_returns_once_flags_are_set() {
        let mut session = session();
        run(&mut session, "time rtc");

        let done = run(&mut session, "wait rtc_enabled 100ms");
        assert_eq!(done[0], "OK wait rtc_enabled");

        let timeout = run(&mut session, "wait mqtt_connected,rtc_enabled 50ms");
        assert_eq!(timeout[0], "TIMEOUT wait observed rtc_enabled");
    }

    #[test]
    fn sensor_fault_sets_error_bit() {
        let mut session = session();
        let lines = run(&mut session, "sensor 2 crc bme280");
        assert!(contains(&lines, "Sensor bme280: ERROR"), "{lines:#?}");

        let status = run(&mut session, "status");
        assert!(contains(&status, "sensor2"), "{status:#?}");
    }

    #[test]
    fn syntax_errors_are_reported() {
        let mut session = session();
        let lines = run(&mut session, "reboot now");
        assert!(lines[0].starts_with("ERR syntax"), "{lines:#?}");
    }

    #[test]
    fn help_lists_topics() {
        let mut session = session();
        let lines = run(&mut session, "help");
        assert_eq!(lines[0], "Available commands:");
        assert_eq!(lines.len(), HELP_TOPICS.len() + 2);

        let unknown = run(&mut session, "help reboot");
        assert!(unknown[1].starts_with("Available topics: link, inet"));
    }
}
