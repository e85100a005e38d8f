//! Boot cause bookkeeping across resets.
//!
//! Before resetting itself the firmware (or an updater staging a new image)
//! leaves a marker word in retained RAM. Resets nobody announced are
//! classified from the STM32G0 `RCC_CSR` reset flags.

use health_core::system::{BootCause, RestartReason};

const MARKER_MAGIC: u32 = 0xB007_0000;
const MARKER_MASK: u32 = 0xFFFF_0000;

const WWDGRSTF: u32 = 1 << 30;
const IWDGRSTF: u32 = 1 << 29;
const SFTRSTF: u32 = 1 << 28;
/// Power-on, power-down or brownout; the G0 does not tell them apart.
const PWRRSTF: u32 = 1 << 27;

const fn marker_code(cause: BootCause) -> u32 {
    match cause {
        BootCause::Unknown => 0,
        BootCause::PowerOn => 1,
        BootCause::Software => 2,
        BootCause::Watchdog => 3,
        BootCause::Panic => 4,
        BootCause::Brownout => 5,
        BootCause::Ota => 6,
        BootCause::OtaFailed => 7,
        BootCause::TransportTimeout => 8,
        BootCause::AllocationFailed => 9,
    }
}

const fn marker_cause(code: u32) -> Option<BootCause> {
    Some(match code {
        0 => BootCause::Unknown,
        1 => BootCause::PowerOn,
        2 => BootCause::Software,
        3 => BootCause::Watchdog,
        4 => BootCause::Panic,
        5 => BootCause::Brownout,
        6 => BootCause::Ota,
        7 => BootCause::OtaFailed,
        8 => BootCause::TransportTimeout,
        9 => BootCause::AllocationFailed,
        _ => return None,
    })
}

pub const fn encode(cause: BootCause) -> u32 {
    MARKER_MAGIC | marker_code(cause)
}

/// Cause recorded for a restart the health service requested.
pub const fn restart_cause(reason: RestartReason) -> BootCause {
    match reason {
        RestartReason::TransportTimeout => BootCause::TransportTimeout,
        RestartReason::AllocationFailed => BootCause::AllocationFailed,
    }
}

/// A valid marker wins over the hardware flags; retained RAM holds garbage
/// after a power cycle, which the magic check rejects.
pub fn classify(marker: u32, reset_flags: u32) -> BootCause {
    let recorded = (marker & MARKER_MASK == MARKER_MAGIC)
        .then(|| marker_cause(marker & !MARKER_MASK))
        .flatten();
    if let Some(cause) = recorded {
        return cause;
    }

    if reset_flags & (IWDGRSTF | WWDGRSTF) != 0 {
        BootCause::Watchdog
    } else if reset_flags & PWRRSTF != 0 {
        BootCause::PowerOn
    } else if reset_flags & SFTRSTF != 0 {
        BootCause::Software
    } else {
        // Reset pin or low-power reset.
        BootCause::Unknown
    }
}

#[cfg(target_os = "none")]
mod retained {
    use core::mem::MaybeUninit;
    use core::ptr;

    #[unsafe(link_section = ".uninit.BOOT_MARKER")]
    static mut BOOT_MARKER: MaybeUninit<u32> = MaybeUninit::uninit();

    const RCC_CSR: *mut u32 = 0x4002_1060 as *mut u32;
    /// Writing this bit clears every reset flag.
    const RMVF: u32 = 1 << 23;

    /// Reads and clears both the marker and the reset flags.
    pub fn take() -> (u32, u32) {
        // Runs once during bring-up, before any task can store a marker.
        unsafe {
            let marker_ptr = (&raw mut BOOT_MARKER).cast::<u32>();
            let marker = ptr::read_volatile(marker_ptr);
            ptr::write_volatile(marker_ptr, 0);

            let flags = ptr::read_volatile(RCC_CSR);
            ptr::write_volatile(RCC_CSR, flags | RMVF);
            (marker, flags)
        }
    }

    pub fn store(marker: u32) {
        // Only written immediately before a reset.
        unsafe {
            ptr::write_volatile((&raw mut BOOT_MARKER).cast::<u32>(), marker);
        }
    }
}

/// Consumes the cause of the current boot. Call once, early in `main`.
#[cfg(target_os = "none")]
pub fn take_boot_cause() -> BootCause {
    let (marker, flags) = retained::take();
    let cause = classify(marker, flags);
    defmt::info!("boot: cause {} (RCC_CSR {=u32:#x})", cause.as_str(), flags);
    cause
}

/// Records the cause the next boot should report.
#[cfg(target_os = "none")]
pub fn mark_next_boot(cause: BootCause) {
    retained::store(encode(cause));
}

#[cfg(not(target_os = "none"))]
pub fn mark_next_boot(cause: BootCause) {
    println!("boot: next boot reports {cause} ({:#x})", encode(cause));
}
