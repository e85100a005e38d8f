//! Platform collaborators: boot diagnostics, restarts, and outbound events.

use core::fmt;

use crate::events::Label;

/// Why the device booted, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BootCause {
    PowerOn,
    Software,
    Watchdog,
    Panic,
    Brownout,
    /// First boot of a freshly installed image that still needs confirming.
    Ota,
    /// The previous image failed verification and was rolled back.
    OtaFailed,
    TransportTimeout,
    AllocationFailed,
    Unknown,
}

impl BootCause {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BootCause::PowerOn => "power on",
            BootCause::Software => "software restart",
            BootCause::Watchdog => "watchdog",
            BootCause::Panic => "panic",
            BootCause::Brownout => "brownout",
            BootCause::Ota => "firmware update",
            BootCause::OtaFailed => "firmware update rolled back",
            BootCause::TransportTimeout => "transport timeout",
            BootCause::AllocationFailed => "allocation failure",
            BootCause::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BootCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the health service asked for a restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartReason {
    /// The transport stayed disconnected past the watchdog deadline.
    TransportTimeout,
    AllocationFailed,
}

impl RestartReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RestartReason::TransportTimeout => "transport timeout",
            RestartReason::AllocationFailed => "allocation failure",
        }
    }

    /// Boot cause the next start will report.
    #[must_use]
    pub const fn boot_cause(self) -> BootCause {
        match self {
            RestartReason::TransportTimeout => BootCause::TransportTimeout,
            RestartReason::AllocationFailed => BootCause::AllocationFailed,
        }
    }
}

/// Heap usage in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeapStats {
    pub total: u32,
    pub free: u32,
    pub min_free: u32,
}

impl HeapStats {
    fn percent(part: u32, total: u32) -> f64 {
        if total == 0 {
            0.0
        } else {
            f64::from(part) * 100.0 / f64::from(total)
        }
    }
}

/// `total : free (pct) : low-water (pct)`, in kilobytes.
impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kb = |bytes: u32| f64::from(bytes) / 1024.0;
        write!(
            f,
            "{:.1}kB : {:.1}kB ({:.1}%) : {:.1}kB ({:.1}%)",
            kb(self.total),
            kb(self.free),
            Self::percent(self.free, self.total),
            kb(self.min_free),
            Self::percent(self.min_free, self.total),
        )
    }
}

/// Facts gathered once the system reaches the started milestone.
#[derive(Clone, Debug, PartialEq)]
pub struct StartupReport {
    pub version: Label,
    pub boot: BootCause,
    pub heap: Option<HeapStats>,
    pub allocation_failures: u32,
}

/// Events the health service publishes to the rest of the firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundEvent {
    ReachabilityConfirmed,
    ReachabilityLost,
    SystemStarted,
}

/// Platform operations the health service depends on.
pub trait SystemControl {
    fn boot_cause(&self) -> BootCause;

    fn firmware_version(&self) -> &str;

    fn heap_stats(&self) -> Option<HeapStats> {
        None
    }

    /// Restarts the device. Hosted implementations may record the request
    /// and return.
    fn restart(&mut self, reason: RestartReason);

    /// Confirms the running image so the bootloader keeps it.
    fn mark_image_valid(&mut self);

    /// Reverts to the previous image and reboots.
    fn rollback_and_reboot(&mut self);

    /// Publishes an outbound event.
    fn post(&mut self, event: OutboundEvent);
}

impl<T: SystemControl + ?Sized> SystemControl for &mut T {
    fn boot_cause(&self) -> BootCause {
        (**self).boot_cause()
    }

    fn firmware_version(&self) -> &str {
        (**self).firmware_version()
    }

    fn heap_stats(&self) -> Option<HeapStats> {
        (**self).heap_stats()
    }

    fn restart(&mut self, reason: RestartReason) {
        (**self).restart(reason);
    }

    fn mark_image_valid(&mut self) {
        (**self).mark_image_valid();
    }

    fn rollback_and_reboot(&mut self) {
        (**self).rollback_and_reboot();
    }

    fn post(&mut self, event: OutboundEvent) {
        (**self).post(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_stats_render_kilobytes_and_percentages() {
        let stats = HeapStats {
            total: 320 * 1024,
            free: 160 * 1024,
            min_free: 32 * 1024,
        };
        let mut rendered = heapless::String::<64>::new();
        fmt::write(&mut rendered, format_args!("{stats}")).expect("fits");
        assert_eq!(
            rendered.as_str(),
            "320.0kB : 160.0kB (50.0%) : 32.0kB (10.0%)"
        );
    }

    #[test]
    fn empty_heap_does_not_divide_by_zero() {
        let stats = HeapStats {
            total: 0,
            free: 0,
            min_free: 0,
        };
        let mut rendered = heapless::String::<64>::new();
        fmt::write(&mut rendered, format_args!("{stats}")).expect("fits");
        assert_eq!(rendered.as_str(), "0.0kB : 0.0kB (0.0%) : 0.0kB (0.0%)");
    }
}
