//! # ESC Driver
//!
//! Ties the throttle mapper, frame encoder, bit-bang transmitter and beep
//! sequencer together behind the per-cycle calls made by the flight loop.
//!
//! ## Per-cycle flow
//!
//! 1. [`EscDriver::set_throttle`] for channels 0, 1, 2, 3 in turn. Each call
//!    maps the throttle and renders the frame into the timeline; the call for
//!    the last channel transmits all four frames at once.
//! 2. [`EscDriver::beep`]. After a long failsafe this overrides the cycle with
//!    a beep command on all four channels and transmits it immediately.
//!
//! ## Usage
//!
//! ```
//! use esc_bitbang::bitbang::analyzer::{CycleModel, LogicAnalyzer};
//! use esc_bitbang::config::DriverConfig;
//! use esc_bitbang::driver::EscDriver;
//! use esc_bitbang::dshot::protocol::Channel;
//! use esc_bitbang::throttle::FlightState;
//!
//! let port = LogicAnalyzer::new(CycleModel::GD32F130);
//! let mut driver = EscDriver::new(DriverConfig::default(), port, 0);
//! let state = FlightState::default();
//!
//! for channel in Channel::ALL {
//!     driver.set_throttle(channel, 0.5, &state, 1_000);
//! }
//! assert!(driver.timeline().is_clear());
//! assert_eq!(driver.port_mut().take_capture().decode_all()[0].len(), 1);
//! ```

use tracing::debug;

use crate::beep::{BeepSequencer, BeepState};
use crate::bitbang::{BitBangPort, Transmitter};
use crate::config::DriverConfig;
use crate::dshot::encoder::PulseTimeline;
use crate::dshot::protocol::{BitRate, Channel, Direction, EscCommand, NUM_CHANNELS};
use crate::throttle::{FlightState, ThrottleMapper};

/// Four channel bit-banged DShot driver
#[derive(Debug)]
pub struct EscDriver<P: BitBangPort> {
    config: DriverConfig,
    timeline: PulseTimeline,
    transmitter: Transmitter<P>,
    mapper: ThrottleMapper,
    beeper: BeepSequencer,
    direction: Direction,
    last_values: [u16; NUM_CHANNELS],
}

impl<P: BitBangPort> EscDriver<P> {
    /// Create a driver on an already configured output port
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved driver settings
    /// * `port` - Output pins, already in push-pull output mode
    /// * `now_us` - Current monotonic time; output stays suppressed if the
    ///   first cycle is already in failsafe
    pub fn new(config: DriverConfig, port: P, now_us: u64) -> Self {
        debug!(
            "ESC driver: {}, bidirectional={}, idle_offset={}",
            BitRate::COMPILED.name(),
            config.bidirectional,
            config.idle_offset
        );
        Self {
            timeline: PulseTimeline::new(),
            transmitter: Transmitter::new(port),
            mapper: ThrottleMapper::new(&config, now_us),
            beeper: BeepSequencer::new(config.beep_timeout_us),
            direction: Direction::default(),
            last_values: [0; NUM_CHANNELS],
            config,
        }
    }

    /// Set the motor direction used by subsequent throttle calls
    pub fn set_direction(&mut self, direction: Direction) {
        if direction != self.direction {
            debug!("Motor direction set to {:?}", direction);
        }
        self.direction = direction;
    }

    /// Current motor direction
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Map and encode one channel's throttle; transmits after the last channel
    ///
    /// # Arguments
    ///
    /// * `channel` - Output channel
    /// * `throttle` - Normalized throttle (clamped to `0.0..=0.999`)
    /// * `state` - On-ground and failsafe flags for this cycle
    /// * `now_us` - Current monotonic time in microseconds
    ///
    /// # Returns
    ///
    /// * `u16` - The 11-bit value encoded for the channel
    pub fn set_throttle(
        &mut self,
        channel: Channel,
        throttle: f32,
        state: &FlightState,
        now_us: u64,
    ) -> u16 {
        let value = self.mapper.map(throttle, self.direction, state, now_us);
        self.timeline.encode(channel, value, false);
        self.last_values[channel.index()] = value;

        if channel.is_last() {
            self.transmitter.transmit(&mut self.timeline);
        }

        value
    }

    /// Run the beep sequencer for this cycle
    ///
    /// When a beep is due, the command is encoded with the telemetry bit set
    /// on all four channels and transmitted immediately, replacing anything
    /// already encoded this cycle.
    ///
    /// # Returns
    ///
    /// * `Option<EscCommand>` - The beep command sent, if any
    pub fn beep(&mut self, failsafe: bool, now_us: u64) -> Option<EscCommand> {
        let command = self.beeper.tick(failsafe, now_us)?;

        if self.timeline.pending() != 0 {
            debug!(
                "Beep replaces partially encoded cycle (pending 0b{:04b})",
                self.timeline.pending()
            );
            self.timeline.clear();
        }

        for channel in Channel::ALL {
            self.timeline.encode(channel, command.value(), true);
        }
        self.transmitter.transmit(&mut self.timeline);

        Some(command)
    }

    /// Values encoded by the last throttle call of each channel
    pub fn last_values(&self) -> [u16; NUM_CHANNELS] {
        self.last_values
    }

    /// Beep sequencer state
    pub fn beep_state(&self) -> BeepState {
        self.beeper.state()
    }

    /// Whether the failsafe cutoff is forcing zero output
    pub fn cutoff_engaged(&self) -> bool {
        self.mapper.cutoff_engaged()
    }

    /// Pulse timeline (zero between cycles)
    pub fn timeline(&self) -> &PulseTimeline {
        &self.timeline
    }

    /// Driver settings
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Output port
    pub fn port(&self) -> &P {
        self.transmitter.port()
    }

    /// Mutable output port
    pub fn port_mut(&mut self) -> &mut P {
        self.transmitter.port_mut()
    }
}
