#![no_std]

#[cfg(feature = "std")]
extern crate std;

// Health and state aggregation for a networked sensor device.
//
// The crate stays portable across MCU firmware and host tooling by avoiding
// the Rust standard library; hosted builds opt into the `std` feature for the
// blocking flag store and `std::error::Error` impls.

pub mod alert;
pub mod clock;
pub mod conditions;
pub mod config;
pub mod events;
pub mod flags;
pub mod indicator;
pub mod monitor;
pub mod ota;
pub mod queue;
pub mod registry;
pub mod repl;
pub mod service;
pub mod status;
pub mod system;
pub mod watchdog;
