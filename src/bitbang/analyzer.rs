//! # Logic Analyzer
//!
//! A simulated [`BitBangPort`] that counts CPU cycles instead of toggling
//! pins. Each pin write and `nop` advances a virtual cycle counter according
//! to a [`CycleModel`], and every level change is recorded as an [`Edge`].
//!
//! The resulting [`Capture`] is what a logic analyzer clipped onto the four
//! ESC lines would show: it can be decoded back into frames and its slot
//! period checked against the protocol's quarter-bit duration.
//!
//! ## Usage
//!
//! ```
//! use esc_bitbang::bitbang::analyzer::{CycleModel, LogicAnalyzer};
//! use esc_bitbang::bitbang::Transmitter;
//! use esc_bitbang::dshot::encoder::PulseTimeline;
//! use esc_bitbang::dshot::protocol::Channel;
//!
//! let mut timeline = PulseTimeline::new();
//! for channel in Channel::ALL {
//!     timeline.encode(channel, 100, false);
//! }
//!
//! let mut tx = Transmitter::new(LogicAnalyzer::new(CycleModel::GD32F130));
//! tx.transmit(&mut timeline);
//!
//! let capture = tx.port_mut().take_capture();
//! assert_eq!(capture.decode_channel(Channel::FRONT_LEFT)[0].raw(), 0x0C84);
//! ```

use super::{BitBangPort, RESET_LEAD, SET_LEAD, SLOT_ENTRY_CYCLES, WRITE_CYCLES};
use crate::dshot::protocol::{Channel, Frame, FRAME_BITS, NUM_CHANNELS};

/// Cycle costs of pin writes on a given core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleModel {
    /// Core clock frequency
    pub clock_hz: u32,
    /// Cycles for one pin store
    pub write_cycles: u32,
}

impl CycleModel {
    /// GD32F130 (Cortex-M3) at 48 MHz
    pub const GD32F130: CycleModel = CycleModel {
        clock_hz: super::CALIBRATED_CLOCK_HZ,
        write_cycles: WRITE_CYCLES as u32,
    };

    /// Same costs on a different core clock
    pub const fn with_clock(self, clock_hz: u32) -> Self {
        Self { clock_hz, ..self }
    }

    /// Convert a cycle count to nanoseconds
    pub fn cycles_to_ns(&self, cycles: u64) -> f64 {
        cycles as f64 * 1e9 / self.clock_hz as f64
    }
}

impl Default for CycleModel {
    fn default() -> Self {
        Self::GD32F130
    }
}

/// A level change on one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Cycle at which the write completed
    pub cycle: u64,
    pub channel: Channel,
    /// `true` for low-to-high
    pub rising: bool,
}

/// Simulated four channel output port
#[derive(Debug, Clone)]
pub struct LogicAnalyzer {
    model: CycleModel,
    cycle: u64,
    levels: [bool; NUM_CHANNELS],
    edges: Vec<Edge>,
    /// Start cycle of each slot, recovered from the channel 0 write
    slot_marks: Vec<u64>,
}

impl LogicAnalyzer {
    /// Create an analyzer with all lines low at cycle 0
    pub fn new(model: CycleModel) -> Self {
        Self {
            model,
            cycle: 0,
            levels: [false; NUM_CHANNELS],
            edges: Vec::new(),
            slot_marks: Vec::new(),
        }
    }

    /// Current virtual cycle
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Current line level of a channel
    pub fn level(&self, channel: Channel) -> bool {
        self.levels[channel.index()]
    }

    /// Cycle model in use
    pub fn model(&self) -> CycleModel {
        self.model
    }

    /// Hand over everything recorded so far and start a fresh capture
    ///
    /// Line levels and the cycle counter carry over.
    pub fn take_capture(&mut self) -> Capture {
        Capture {
            model: self.model,
            edges: core::mem::take(&mut self.edges),
            slot_marks: core::mem::take(&mut self.slot_marks),
        }
    }

    fn write(&mut self, channel: Channel, high: bool) {
        if channel.index() == 0 {
            let lead = if high { SET_LEAD } else { RESET_LEAD };
            let start = self.cycle.saturating_sub((SLOT_ENTRY_CYCLES + lead) as u64);
            self.slot_marks.push(start);
        }
        self.cycle += self.model.write_cycles as u64;

        let level = &mut self.levels[channel.index()];
        if *level != high {
            *level = high;
            self.edges.push(Edge {
                cycle: self.cycle,
                channel,
                rising: high,
            });
        }
    }
}

impl BitBangPort for LogicAnalyzer {
    fn set_high(&mut self, channel: Channel) {
        self.write(channel, true);
    }

    fn set_low(&mut self, channel: Channel) {
        self.write(channel, false);
    }

    fn nop<const N: usize>(&mut self) {
        self.cycle += N as u64;
    }
}

/// Recorded edges from one or more transmissions
#[derive(Debug, Clone, Default)]
pub struct Capture {
    model: CycleModel,
    edges: Vec<Edge>,
    slot_marks: Vec<u64>,
}

impl Capture {
    /// All recorded edges in time order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// True if nothing was transmitted
    pub fn is_empty(&self) -> bool {
        self.slot_marks.is_empty()
    }

    /// Number of slots emitted
    pub fn slot_count(&self) -> usize {
        self.slot_marks.len()
    }

    /// Cycles of the rising edges on a channel
    pub fn rising_edges(&self, channel: Channel) -> Vec<u64> {
        self.edge_cycles(channel, true)
    }

    /// Cycles of the falling edges on a channel
    pub fn falling_edges(&self, channel: Channel) -> Vec<u64> {
        self.edge_cycles(channel, false)
    }

    fn edge_cycles(&self, channel: Channel, rising: bool) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|e| e.channel == channel && e.rising == rising)
            .map(|e| e.cycle)
            .collect()
    }

    /// Start cycle of the slot containing `cycle`, 0 before the first slot
    pub fn slot_start(&self, cycle: u64) -> u64 {
        let idx = self.slot_marks.partition_point(|&mark| mark <= cycle);
        if idx == 0 {
            0
        } else {
            self.slot_marks[idx - 1]
        }
    }

    /// Mean slot duration in nanoseconds, `None` with fewer than two slots
    pub fn slot_period_ns(&self) -> Option<f64> {
        let (first, last) = (self.slot_marks.first()?, self.slot_marks.last()?);
        let spans = self.slot_marks.len().checked_sub(1).filter(|&n| n > 0)?;
        Some(self.model.cycles_to_ns(last - first) / spans as f64)
    }

    /// Recover the frames sent on a channel from pulse timing
    ///
    /// Every bit starts with a rising edge. A bit is a 1 when its high time is
    /// more than half of the rise-to-rise period. Frames are not checksum
    /// checked; use [`Frame::is_valid`].
    pub fn decode_channel(&self, channel: Channel) -> Vec<Frame> {
        let rises = self.rising_edges(channel);
        let falls = self.falling_edges(channel);
        let pulses = rises.len().min(falls.len());

        let mut frames = Vec::with_capacity(pulses / FRAME_BITS);
        for start in (0..pulses / FRAME_BITS).map(|n| n * FRAME_BITS) {
            let mut raw = 0u16;
            for bit in start..start + FRAME_BITS {
                let high = falls[bit].saturating_sub(rises[bit]);
                let period = if bit + 1 < start + FRAME_BITS {
                    rises[bit + 1] - rises[bit]
                } else {
                    rises[bit] - rises[bit - 1]
                };
                raw = (raw << 1) | u16::from(high * 2 > period);
            }
            frames.push(Frame::from_raw(raw));
        }
        frames
    }

    /// Frames for all channels, indexed by channel
    pub fn decode_all(&self) -> [Vec<Frame>; NUM_CHANNELS] {
        Channel::ALL.map(|channel| self.decode_channel(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitbang::{Transmitter, SLOT_CYCLES};
    use crate::dshot::encoder::PulseTimeline;

    fn send(values: [u16; NUM_CHANNELS], telemetry: bool) -> Capture {
        let mut timeline = PulseTimeline::new();
        for (channel, value) in Channel::ALL.into_iter().zip(values) {
            timeline.encode(channel, value, telemetry);
        }
        let mut tx = Transmitter::new(LogicAnalyzer::new(CycleModel::GD32F130));
        tx.transmit(&mut timeline);
        tx.port_mut().take_capture()
    }

    #[test]
    fn test_cycles_to_ns() {
        let model = CycleModel::GD32F130;
        assert!((model.cycles_to_ns(48) - 1000.0).abs() < 1e-9);
        assert!((model.with_clock(96_000_000).cycles_to_ns(48) - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_slot_count() {
        let capture = send([100, 100, 100, 100], false);
        assert_eq!(capture.slot_count(), 64);
        assert!(!capture.is_empty());
    }

    #[test]
    fn test_only_level_changes_recorded() {
        let mut analyzer = LogicAnalyzer::new(CycleModel::GD32F130);
        analyzer.set_low(Channel::BACK_LEFT);
        analyzer.set_high(Channel::BACK_LEFT);
        analyzer.set_high(Channel::BACK_LEFT);
        analyzer.set_low(Channel::BACK_LEFT);
        let capture = analyzer.take_capture();
        assert_eq!(capture.edges().len(), 2);
        assert!(capture.edges()[0].rising);
        assert!(!capture.edges()[1].rising);
    }

    #[test]
    fn test_write_costs() {
        let mut analyzer = LogicAnalyzer::new(CycleModel::GD32F130);
        analyzer.nop::<3>();
        assert_eq!(analyzer.cycle(), 3);
        analyzer.set_high(Channel::BACK_RIGHT);
        assert_eq!(analyzer.cycle(), 5);
        assert_eq!(analyzer.take_capture().edges()[0].cycle, 5);
        assert!(analyzer.level(Channel::BACK_RIGHT));
    }

    #[test]
    fn test_slot_start_recovered_from_channel_0() {
        let mut analyzer = LogicAnalyzer::new(CycleModel::GD32F130);
        analyzer.nop::<100>();
        analyzer.nop::<SLOT_ENTRY_CYCLES>();
        analyzer.nop::<SET_LEAD>();
        analyzer.set_high(Channel::FRONT_LEFT);
        let capture = analyzer.take_capture();
        assert_eq!(capture.slot_start(capture.edges()[0].cycle), 100);
    }

    #[test]
    fn test_pulse_widths() {
        let capture = send([2047, 2047, 2047, 2047], false);
        // value 2047, no telemetry: first bit is a 1, high for 3 of 4 slots
        // plus the one cycle the reset store trails the set store
        let rises = capture.rising_edges(Channel::FRONT_LEFT);
        let falls = capture.falling_edges(Channel::FRONT_LEFT);
        let slot = SLOT_CYCLES as u64;
        assert_eq!(falls[0] - rises[0], 3 * slot + 1);
        assert_eq!(rises[1] - rises[0], 4 * slot);
    }

    #[test]
    fn test_decode_with_telemetry() {
        let capture = send([1, 3, 2, 4], true);
        let frames = capture.decode_all();
        for (frames, value) in frames.iter().zip([1, 3, 2, 4]) {
            assert_eq!(frames.len(), 1);
            assert!(frames[0].is_valid());
            assert!(frames[0].telemetry());
            assert_eq!(frames[0].value(), value);
        }
    }

    #[test]
    fn test_decode_consecutive_transmissions() {
        let mut tx = Transmitter::new(LogicAnalyzer::new(CycleModel::GD32F130));
        for value in [500, 501] {
            let mut timeline = PulseTimeline::new();
            timeline.encode(Channel::FRONT_RIGHT, value, false);
            tx.transmit(&mut timeline);
        }
        let mut analyzer = tx.into_port();
        let capture = analyzer.take_capture();
        assert_eq!(
            capture.decode_channel(Channel::FRONT_RIGHT),
            vec![Frame::new(500, false), Frame::new(501, false)]
        );
        assert!(capture.decode_channel(Channel::FRONT_LEFT).is_empty());
    }

    #[test]
    fn test_slot_period_requires_two_slots() {
        let mut analyzer = LogicAnalyzer::new(CycleModel::GD32F130);
        assert!(analyzer.take_capture().slot_period_ns().is_none());
        analyzer.set_high(Channel::FRONT_LEFT);
        assert!(analyzer.take_capture().slot_period_ns().is_none());
    }

    #[test]
    fn test_faster_clock_shortens_slots() {
        let mut timeline = PulseTimeline::new();
        timeline.encode(Channel::FRONT_LEFT, 100, false);
        let model = CycleModel::GD32F130.with_clock(72_000_000);
        let mut tx = Transmitter::new(LogicAnalyzer::new(model));
        tx.transmit(&mut timeline);
        let period = tx.port_mut().take_capture().slot_period_ns().unwrap();
        // same cycle count on a faster core: slots shrink by 48/72
        let expected = SLOT_CYCLES as f64 * 1e9 / 72_000_000.0;
        assert!((period - expected).abs() < 0.01);
    }
}
