//! # Bit-Bang Transmitter Module
//!
//! Emits the pulse timeline on four output pins in lockstep by toggling them
//! directly, with cycle-counted delays between writes. No timer, DMA or UART
//! is involved.
//!
//! This module handles:
//! - The [`BitBangPort`] seam between the transmit loop and the pins
//! - The per-slot cycle budget of the compiled bit rate
//! - Draining (and zeroing) the timeline inside a critical section
//! - A memory-mapped register port for real hardware ([`mmio`])
//! - A cycle-counting logic analyzer for timing verification ([`analyzer`])
//!
//! ## Slot budget
//!
//! One slot is a quarter of a protocol bit. Every delay below is a `const`,
//! so each `nop` run is a straight line of instructions with no loop counter:
//!
//! ```text
//! | entry | ch0 | ch1 | ch2 | ch3 | padding | exit |
//!     4     5     5     5     5    12 / 52     4      = 40 / 80 cycles at 48 MHz
//! ```
//!
//! Every channel costs [`CHANNEL_CYCLES`] whatever its level. A set is
//! preceded by [`SET_LEAD`] cycles and followed by [`SET_TAIL`]; a reset is
//! preceded by [`RESET_LEAD`]. Rising edges therefore land one cycle ahead of
//! falling edges, the same skew on every channel and every slot.
//!
//! The bit rate is fixed by the `dshot300` / `dshot150` feature.

#[cfg(any(test, feature = "std"))]
pub mod analyzer;
pub mod mmio;

use crate::dshot::encoder::PulseTimeline;
use crate::dshot::protocol::{BitRate, Channel, NUM_CHANNELS, TIMELINE_SLOTS};

/// Core clock the slot budget is counted for
pub const CALIBRATED_CLOCK_HZ: u32 = 48_000_000;

/// Cycles of one slot at the compiled bit rate
pub const SLOT_CYCLES: usize =
    (CALIBRATED_CLOCK_HZ / (BitRate::COMPILED.bits_per_second() * 4)) as usize;

/// Cycles of one pin store
pub const WRITE_CYCLES: usize = 2;

/// Cycles before a set store (test, if-then)
pub const SET_LEAD: usize = 2;

/// Cycles after a set store (the skipped reset store)
pub const SET_TAIL: usize = 1;

/// Cycles before a reset store (test, if-then, the skipped set store)
pub const RESET_LEAD: usize = 3;

/// Cycles spent on one channel, equal for both levels
pub const CHANNEL_CYCLES: usize = SET_LEAD + WRITE_CYCLES + SET_TAIL;

/// Cycles before the first channel: load the slot, store zero back
pub const SLOT_ENTRY_CYCLES: usize = 4;

/// Cycles after the padding: decrement, taken branch
pub const SLOT_EXIT_CYCLES: usize = 4;

/// `nop`s filling the slot up to [`SLOT_CYCLES`]
pub const SLOT_PADDING: usize =
    SLOT_CYCLES - SLOT_ENTRY_CYCLES - NUM_CHANNELS * CHANNEL_CYCLES - SLOT_EXIT_CYCLES;

const _: () = assert!(RESET_LEAD + WRITE_CYCLES == CHANNEL_CYCLES);
const _: () = assert!(
    SLOT_CYCLES * 4 * BitRate::COMPILED.bits_per_second() as usize == CALIBRATED_CLOCK_HZ as usize
);

/// Output pins driven by the transmitter
///
/// `set_high` and `set_low` must each cost [`WRITE_CYCLES`], and `nop::<N>`
/// exactly `N` cycles, for the slot budget to hold.
pub trait BitBangPort {
    /// Drive the channel's pin high
    fn set_high(&mut self, channel: Channel);

    /// Drive the channel's pin low
    fn set_low(&mut self, channel: Channel);

    /// Burn `N` single-cycle no-ops
    fn nop<const N: usize>(&mut self);

    /// Emit the whole timeline, zeroing each slot as it is consumed
    ///
    /// The default body is the cycle-for-cycle equivalent of the hardware
    /// loop in [`mmio`]: the leading and trailing `nop` runs stand for the
    /// loop's load, store and branch instructions. Ports on a core with a
    /// hand-written loop override it.
    #[inline(always)]
    fn emit_timeline(&mut self, slots: &mut [u8; TIMELINE_SLOTS]) {
        for slot in slots.iter_mut() {
            let data = core::mem::take(slot);
            self.nop::<SLOT_ENTRY_CYCLES>();

            for channel in Channel::ALL {
                if data & channel.mask() != 0 {
                    self.nop::<SET_LEAD>();
                    self.set_high(channel);
                    self.nop::<SET_TAIL>();
                } else {
                    self.nop::<RESET_LEAD>();
                    self.set_low(channel);
                }
            }

            self.nop::<SLOT_PADDING>();
            self.nop::<SLOT_EXIT_CYCLES>();
        }
    }
}

/// Drains the pulse timeline onto a [`BitBangPort`]
#[derive(Debug)]
pub struct Transmitter<P: BitBangPort> {
    port: P,
}

impl<P: BitBangPort> Transmitter<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    /// Send the whole timeline and leave it zeroed
    ///
    /// Runs with interrupts excluded. Do not add work inside
    /// [`BitBangPort::emit_timeline`] without recounting the slot budget:
    /// every extra instruction shifts the pulse widths seen by the ESCs.
    #[inline(never)]
    pub fn transmit(&mut self, timeline: &mut PulseTimeline) {
        let port = &mut self.port;
        let slots = timeline.slots_mut();

        critical_section::with(|_cs| port.emit_timeline(slots));

        timeline.mark_sent();
    }

    /// Output port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutable output port
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transmitter, returning the port
    pub fn into_port(self) -> P {
        self.port
    }
}
