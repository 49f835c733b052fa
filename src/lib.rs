//! # ESC Bitbang Library
//!
//! Four channel DShot motor output generated by toggling GPIO pins from
//! software, for flight controllers without a spare timer or DMA channel.
//!
//! Each control cycle the flight loop hands a normalized throttle per motor to
//! the [`driver::EscDriver`]. Values are mapped to the 11-bit DShot range,
//! rendered into a shared 64-slot pulse timeline and clocked out on all four
//! pins at once with cycle-counted delays. After a long link loss the driver
//! switches to beep commands so the craft can be found.
//!
//! The bit rate is chosen at build time with the `dshot300` (default) or
//! `dshot150` feature; `bidirectional` enables the 3D forward/reverse split.
//!
//! The default `std` feature adds the host bench ([`bench`]), the JSONL
//! capture log ([`capture`]) and TOML configuration files. Without it the
//! crate is `no_std` and builds for the flight controller itself.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(all(feature = "dshot150", feature = "dshot300"))]
compile_error!("features `dshot150` and `dshot300` are mutually exclusive");

#[cfg(not(any(feature = "dshot150", feature = "dshot300")))]
compile_error!("enable exactly one bit-rate feature: `dshot150` or `dshot300`");

pub mod beep;
#[cfg(feature = "std")]
pub mod bench;
pub mod bitbang;
#[cfg(feature = "std")]
pub mod capture;
pub mod config;
pub mod driver;
pub mod dshot;
pub mod error;
pub mod throttle;
