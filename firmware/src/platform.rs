//! Board collaborators handed to the health service: clock, alert sink, and
//! system control.

use core::ops::Add;
use core::time::Duration;

use embassy_time::{Duration as EmbassyDuration, Instant};
use health_core::alert::{Alert, AlertChannel, AlertFormatter, AlertSink, EpochSeconds};
use health_core::clock::{Clock, Timestamp};
use health_core::system::{BootCause, OutboundEvent, RestartReason, SystemControl};

use crate::boot;

/// Longest rendered alert; longer messages are rejected rather than cut.
pub const ALERT_TEXT_CAPACITY: usize = 192;

/// Embassy instant that accepts `core::time::Duration` offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        let offset = EmbassyDuration::from_micros(micros);
        Self(self.0.checked_add(offset).unwrap_or(Instant::MAX))
    }
}

/// Monotonic clock on the embassy time driver.
///
/// Without a calendar source the wall time is the boot epoch plus uptime.
#[derive(Clone, Copy, Debug)]
pub struct FirmwareClock {
    epoch_at_boot: u64,
}

impl FirmwareClock {
    pub const fn new(epoch_at_boot: u64) -> Self {
        Self { epoch_at_boot }
    }
}

impl Clock for FirmwareClock {
    type Instant = FirmwareInstant;

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant(Instant::now())
    }

    fn wall_time(&self) -> Timestamp {
        Timestamp::from_secs(self.epoch_at_boot.saturating_add(Instant::now().as_secs()))
    }
}

/// Alert sink that renders alerts onto the debug log.
#[derive(Debug, Default)]
pub struct LogAlertSink {
    delivered: u32,
}

impl LogAlertSink {
    pub const fn new() -> Self {
        Self { delivered: 0 }
    }
}

impl AlertSink for LogAlertSink {
    type Error = core::fmt::Error;

    fn deliver(&mut self, alert: &Alert) -> Result<(), Self::Error> {
        let mut text: heapless::String<ALERT_TEXT_CAPACITY> = heapless::String::new();
        AlertFormatter::new(&EpochSeconds).write_alert(&mut text, alert)?;
        self.delivered = self.delivered.wrapping_add(1);
        emit_alert(channel_label(alert.channel), self.delivered, &text);
        Ok(())
    }
}

const fn channel_label(channel: AlertChannel) -> &'static str {
    match channel {
        AlertChannel::Main => "main",
        AlertChannel::Service => "service",
    }
}

/// Restart and image control through the Cortex-M core.
pub struct BoardSystem {
    boot: BootCause,
}

impl BoardSystem {
    pub const fn new(boot: BootCause) -> Self {
        Self { boot }
    }
}

impl SystemControl for BoardSystem {
    fn boot_cause(&self) -> BootCause {
        self.boot
    }

    fn firmware_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn restart(&mut self, reason: RestartReason) {
        emit_system("restart", reason.as_str());
        boot::mark_next_boot(boot::restart_cause(reason));
        reset();
    }

    fn mark_image_valid(&mut self) {
        emit_system("image", "marked valid");
    }

    fn rollback_and_reboot(&mut self) {
        emit_system("image", "verification failed, rolling back");
        boot::mark_next_boot(BootCause::OtaFailed);
        reset();
    }

    fn post(&mut self, event: OutboundEvent) {
        let name = match event {
            OutboundEvent::ReachabilityConfirmed => "reachability confirmed",
            OutboundEvent::ReachabilityLost => "reachability lost",
            OutboundEvent::SystemStarted => "system started",
        };
        emit_system("event", name);
    }
}

#[cfg(target_os = "none")]
fn emit_alert(channel: &'static str, sequence: u32, text: &str) {
    defmt::info!("alert[{}] #{}: {}", channel, sequence, text);
}

#[cfg(not(target_os = "none"))]
fn emit_alert(channel: &'static str, sequence: u32, text: &str) {
    println!("alert[{channel}] #{sequence}: {text}");
}

#[cfg(target_os = "none")]
fn emit_system(topic: &'static str, detail: &str) {
    defmt::warn!("system:{} {}", topic, detail);
}

#[cfg(not(target_os = "none"))]
fn emit_system(topic: &'static str, detail: &str) {
    println!("system:{topic} {detail}");
}

#[cfg(target_os = "none")]
fn reset() {
    cortex_m::peripheral::SCB::sys_reset();
}

#[cfg(not(target_os = "none"))]
fn reset() {
    println!("system:reset skipped on host");
}

#[cfg(test)]
mod tests {
    use super::*;
    use health_core::events::{SensorStatus, label};

    #[test]
    fn instant_addition_saturates() {
        let max = FirmwareInstant::from(Instant::MAX);
        assert_eq!(max + Duration::from_secs(1), max);

        let start = FirmwareInstant::from(Instant::from_secs(10));
        assert_eq!(
            (start + Duration::from_millis(1_500)).into_embassy(),
            Instant::from_millis(11_500)
        );
    }

    #[test]
    fn sink_counts_deliveries() {
        let mut sink = LogAlertSink::new();
        sink.deliver(&Alert::sensor(label("bme280"), SensorStatus::Timeout))
            .expect("fits buffer");
        sink.deliver(&Alert::silent_mode(true)).expect("fits buffer");
        assert_eq!(sink.delivered, 2);
    }
}
