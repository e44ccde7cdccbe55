//! Line-following robot core
//!
//! Hardware-independent sensing and control for a line-following robot that
//! halts in front of obstacles and asks a remote camera to take a picture.
//!
//! Everything in here is generic over `embedded-hal` traits and an injectable
//! [`driver::timing::Clock`], so the same code runs in the firmware and in host tests.
//! The firmware binary (`src/main.rs`, feature `firmware`) binds it to RP2350 peripherals.

#![cfg_attr(not(test), no_std)]

// must stay first so the logging macros are visible to every module
#[macro_use]
mod fmt;

/// Control laws and protocols
pub mod control;
/// Sensor, actuator and radio drivers
pub mod driver;
/// Shared state, configuration and events
pub mod system;
