//! # DShot Protocol Module
//!
//! Frame construction and pulse shaping for the DShot ESC protocol.
//!
//! This module handles:
//! - 16-bit frame layout (11-bit value, telemetry bit, 4-bit checksum)
//! - Nibble XOR checksum
//! - Rendering frames into the four-channel pulse timeline

pub mod protocol;
pub mod checksum;
pub mod encoder;
