//! # DShot Protocol Constants and Types
//!
//! Core protocol definitions for DShot ESC communication.

use serde::Deserialize;

use super::checksum::frame_checksum;
use crate::error::{EscError, Result};

/// Number of ESC channels driven in lockstep
pub const NUM_CHANNELS: usize = 4;

/// Bits per DShot frame (11-bit value + telemetry bit + 4-bit checksum)
pub const FRAME_BITS: usize = 16;

/// Timeline slots used to shape one protocol bit
pub const SLOTS_PER_BIT: usize = 4;

/// Total slots in the pulse timeline
pub const TIMELINE_SLOTS: usize = FRAME_BITS * SLOTS_PER_BIT;

/// Largest value that fits into the 11-bit field
pub const DSHOT_VALUE_MAX: u16 = 2047;

/// First value interpreted as throttle (0-47 are commands)
pub const DSHOT_THROTTLE_MIN: u16 = 48;

/// First value of the reverse half in bidirectional mode
pub const DSHOT_REVERSE_MIN: u16 = 1048;

/// Motor direction for bidirectional (3D) mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Values 48..=1047
    #[default]
    Forward,
    /// Values 1048..=2047
    Reverse,
}

/// Protocol bit rate.
///
/// Only one rate is compiled into the transmitter (see [`BitRate::COMPILED`]),
/// but both can be instantiated for timing analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitRate {
    /// 150 kbit/s, 6.67 µs per bit
    Dshot150,
    /// 300 kbit/s, 3.33 µs per bit
    Dshot300,
}

impl BitRate {
    /// Bit rate selected by the `dshot150` / `dshot300` cargo feature
    #[cfg(feature = "dshot300")]
    pub const COMPILED: BitRate = BitRate::Dshot300;

    /// Bit rate selected by the `dshot150` / `dshot300` cargo feature
    #[cfg(all(feature = "dshot150", not(feature = "dshot300")))]
    pub const COMPILED: BitRate = BitRate::Dshot150;

    /// Bits per second
    pub const fn bits_per_second(self) -> u32 {
        match self {
            BitRate::Dshot150 => 150_000,
            BitRate::Dshot300 => 300_000,
        }
    }

    /// Duration of one protocol bit in nanoseconds
    pub fn bit_period_ns(self) -> f64 {
        1e9 / self.bits_per_second() as f64
    }

    /// Duration of one timeline slot (a quarter bit) in nanoseconds
    pub fn slot_period_ns(self) -> f64 {
        self.bit_period_ns() / SLOTS_PER_BIT as f64
    }

    /// Human readable name, e.g. "DShot300"
    pub const fn name(self) -> &'static str {
        match self {
            BitRate::Dshot150 => "DShot150",
            BitRate::Dshot300 => "DShot300",
        }
    }
}

/// Physical position of the motor wired to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorPosition {
    FrontLeft,
    BackLeft,
    FrontRight,
    BackRight,
}

/// One of the four ESC output channels.
///
/// Each channel owns one bit of every timeline slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    pub const FRONT_LEFT: Channel = Channel(0);
    pub const BACK_LEFT: Channel = Channel(1);
    pub const FRONT_RIGHT: Channel = Channel(2);
    pub const BACK_RIGHT: Channel = Channel(3);

    /// All channels in transmit order
    pub const ALL: [Channel; NUM_CHANNELS] = [
        Channel::FRONT_LEFT,
        Channel::BACK_LEFT,
        Channel::FRONT_RIGHT,
        Channel::BACK_RIGHT,
    ];

    /// Zero-based channel index
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Bit owned by this channel in a timeline slot
    pub const fn mask(self) -> u8 {
        1 << self.0
    }

    /// The last channel of a cycle; encoding it triggers transmission
    pub const fn is_last(self) -> bool {
        self.0 as usize == NUM_CHANNELS - 1
    }

    /// Motor position wired to this channel
    pub const fn position(self) -> MotorPosition {
        match self.0 {
            0 => MotorPosition::FrontLeft,
            1 => MotorPosition::BackLeft,
            2 => MotorPosition::FrontRight,
            _ => MotorPosition::BackRight,
        }
    }
}

impl TryFrom<u8> for Channel {
    type Error = EscError;

    fn try_from(index: u8) -> Result<Self> {
        if (index as usize) < NUM_CHANNELS {
            Ok(Channel(index))
        } else {
            Err(EscError::InvalidChannel(index))
        }
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ESC{}", self.0 + 1)
    }
}

/// Special command values below [`DSHOT_THROTTLE_MIN`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EscCommand {
    MotorStop = 0,
    Beep1 = 1,
    Beep2 = 2,
    Beep3 = 3,
    Beep4 = 4,
    /// Same tone as Beep4 on BLHeli_S
    Beep5 = 5,
}

impl EscCommand {
    /// 11-bit value carried in the frame
    pub const fn value(self) -> u16 {
        self as u16
    }
}

/// A 16-bit DShot frame.
///
/// Layout, MSB first:
///
/// ```text
/// | value (11 bits) | telemetry (1 bit) | checksum (4 bits) |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    raw: u16,
}

impl Frame {
    /// Build a frame from an 11-bit value and the telemetry request flag
    ///
    /// # Arguments
    ///
    /// * `value` - Throttle or command value (0-2047); higher bits are dropped
    /// * `telemetry` - Request a telemetry response from the ESC
    ///
    /// # Examples
    ///
    /// ```
    /// use esc_bitbang::dshot::protocol::Frame;
    ///
    /// let frame = Frame::new(100, false);
    /// assert_eq!(frame.raw(), 0x0C84);
    /// ```
    pub const fn new(value: u16, telemetry: bool) -> Self {
        let field = ((value & DSHOT_VALUE_MAX) << 1) | telemetry as u16;
        Self {
            raw: (field << 4) | frame_checksum(field),
        }
    }

    /// Wrap a raw 16-bit word without checking it
    pub const fn from_raw(raw: u16) -> Self {
        Self { raw }
    }

    /// Wrap a raw 16-bit word, rejecting a bad checksum
    pub fn decode(raw: u16) -> Option<Self> {
        let frame = Self::from_raw(raw);
        frame.is_valid().then_some(frame)
    }

    /// Raw 16-bit word as sent on the wire
    pub const fn raw(&self) -> u16 {
        self.raw
    }

    /// 11-bit throttle/command value
    pub const fn value(&self) -> u16 {
        self.raw >> 5
    }

    /// Telemetry request flag
    pub const fn telemetry(&self) -> bool {
        self.raw & 0x10 != 0
    }

    /// 4-bit checksum stored in the frame
    pub const fn checksum(&self) -> u16 {
        self.raw & 0x0F
    }

    /// Whether the stored checksum matches the value and telemetry bits
    pub const fn is_valid(&self) -> bool {
        frame_checksum(self.raw >> 4) == self.checksum()
    }
}
