//! Verification window for freshly installed firmware images.
//!
//! After an OTA boot the image stays provisional until the system reaches the
//! started milestone. If the window closes first, the caller rolls back. Both
//! outcomes are terminal for the lifetime of the process.

use core::ops::Add;
use core::time::Duration;

use crate::system::BootCause;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtaPhase<I> {
    /// Not an OTA boot, or the verifier was never armed.
    Inactive,
    Armed { deadline: I },
    Verified,
    RolledBack,
}

#[derive(Clone, Copy, Debug)]
pub struct OtaVerifier<I> {
    window: Duration,
    phase: OtaPhase<I>,
}

impl<I> OtaVerifier<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            phase: OtaPhase::Inactive,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> OtaPhase<I> {
        self.phase
    }

    #[must_use]
    pub fn deadline(&self) -> Option<I> {
        match self.phase {
            OtaPhase::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Opens the verification window when the device booted into a new image.
    /// Returns `true` when the window was opened.
    pub fn arm(&mut self, boot: BootCause, now: I) -> bool {
        if boot != BootCause::Ota || self.phase != OtaPhase::Inactive {
            return false;
        }
        let deadline = now + self.window;
        self.phase = OtaPhase::Armed { deadline };
        log::info!(
            "ota verification window open for {}s",
            self.window.as_secs()
        );
        true
    }

    /// Accepts the image. Returns `true` exactly once, when the caller must
    /// mark the image valid.
    pub fn confirm(&mut self) -> bool {
        if let OtaPhase::Armed { .. } = self.phase {
            self.phase = OtaPhase::Verified;
            log::info!("ota image verified");
            true
        } else {
            false
        }
    }

    /// Returns `true` exactly once, when the window has closed unconfirmed and
    /// the caller must roll back.
    pub fn poll(&mut self, now: I) -> bool {
        match self.phase {
            OtaPhase::Armed { deadline } if now >= deadline => {
                self.phase = OtaPhase::RolledBack;
                log::error!("ota verification window expired, rolling back");
                true
            }
            _ => false,
        }
    }
}
