//! # Pulse Timeline Encoder
//!
//! Renders DShot frames into the shared pulse timeline consumed by the
//! bit-bang transmitter.
//!
//! Every protocol bit becomes four consecutive slots. Each slot is a bitmask
//! with one bit per channel, so all four channels are shaped in parallel:
//!
//! ```text
//! bit 1:  ███_   high for 3 slots, low for 1
//! bit 0:  █___   high for 1 slot, low for 3
//! ```
//!
//! ## Buffer contract
//!
//! - Before the first channel is encoded in a cycle, every slot is zero.
//! - Each channel is encoded at most once between two transmissions.
//! - The transmitter zeroes each slot as it consumes it, which restores the
//!   first condition.

use tracing::warn;

use super::protocol::{Channel, Frame, FRAME_BITS, SLOTS_PER_BIT, TIMELINE_SLOTS};

/// Bit-time-sliced representation of the current frames of all channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseTimeline {
    slots: [u8; TIMELINE_SLOTS],
    /// Channels encoded since the last transmission
    pending: u8,
}

impl Default for PulseTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseTimeline {
    /// Create an empty (all zero) timeline
    pub const fn new() -> Self {
        Self {
            slots: [0; TIMELINE_SLOTS],
            pending: 0,
        }
    }

    /// Build a frame and render it for one channel
    ///
    /// # Arguments
    ///
    /// * `channel` - Output channel whose bit is written
    /// * `value` - 11-bit throttle or command value
    /// * `telemetry` - Telemetry request flag
    ///
    /// # Returns
    ///
    /// * `Frame` - The frame that was rendered
    ///
    /// # Examples
    ///
    /// ```
    /// use esc_bitbang::dshot::encoder::PulseTimeline;
    /// use esc_bitbang::dshot::protocol::Channel;
    ///
    /// let mut timeline = PulseTimeline::new();
    /// let frame = timeline.encode(Channel::FRONT_LEFT, 100, false);
    /// assert_eq!(frame.raw(), 0x0C84);
    /// assert_eq!(timeline.read_channel(Channel::FRONT_LEFT), Some(0x0C84));
    /// ```
    pub fn encode(&mut self, channel: Channel, value: u16, telemetry: bool) -> Frame {
        let frame = Frame::new(value, telemetry);
        self.encode_frame(channel, frame);
        frame
    }

    /// Render an already built frame for one channel
    ///
    /// Only the channel's own bit is ORed into each slot, so channels can be
    /// encoded in any order within a cycle.
    pub fn encode_frame(&mut self, channel: Channel, frame: Frame) {
        let mask = channel.mask();
        if self.pending & mask != 0 {
            warn!("{} encoded twice before transmission, pulses will merge", channel);
        }
        self.pending |= mask;

        let mut packet = frame.raw();
        for bit in 0..FRAME_BITS {
            let base = bit * SLOTS_PER_BIT;
            // every bit starts with a high slot
            self.slots[base] |= mask;
            if packet & 0x8000 != 0 {
                self.slots[base + 1] |= mask;
                self.slots[base + 2] |= mask;
            }
            packet <<= 1;
        }
    }

    /// Recover the raw frame rendered for a channel
    ///
    /// # Returns
    ///
    /// * `Option<u16>` - Raw frame, or `None` if any bit's slots are not one
    ///   of the two valid pulse shapes (e.g. the channel was not encoded)
    pub fn read_channel(&self, channel: Channel) -> Option<u16> {
        let mask = channel.mask();
        let mut raw = 0u16;
        for bit in self.slots.chunks_exact(SLOTS_PER_BIT) {
            let shape: [bool; SLOTS_PER_BIT] = [
                bit[0] & mask != 0,
                bit[1] & mask != 0,
                bit[2] & mask != 0,
                bit[3] & mask != 0,
            ];
            raw <<= 1;
            match shape {
                [true, true, true, false] => raw |= 1,
                [true, false, false, false] => {}
                _ => return None,
            }
        }
        Some(raw)
    }

    /// Raw slot bitmasks
    pub fn slots(&self) -> &[u8; TIMELINE_SLOTS] {
        &self.slots
    }

    /// Mask of channels encoded since the last transmission
    pub fn pending(&self) -> u8 {
        self.pending
    }

    /// True when every slot is zero and no channel is pending
    pub fn is_clear(&self) -> bool {
        self.pending == 0 && self.slots.iter().all(|&slot| slot == 0)
    }

    /// Zero the whole timeline without transmitting
    pub fn clear(&mut self) {
        self.slots = [0; TIMELINE_SLOTS];
        self.pending = 0;
    }

    /// Mutable access for the transmitter, which zeroes slots as it reads them
    pub(crate) fn slots_mut(&mut self) -> &mut [u8; TIMELINE_SLOTS] {
        &mut self.slots
    }

    /// Called by the transmitter once the slots have been drained
    pub(crate) fn mark_sent(&mut self) {
        self.pending = 0;
    }
}
