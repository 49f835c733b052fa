//! # Bench Runner
//!
//! Drives an [`EscDriver`] through scripted control cycles so the output can
//! be inspected without a flight controller. The script comes from the
//! `[bench]` configuration section: constant throttle and direction, an
//! optional on-ground flag, and an optional link loss after a delay.
//!
//! Time comes from a [`Clock`], which tests replace with a mock.

use std::time::Instant;

use tracing::info;

use crate::bitbang::BitBangPort;
use crate::config::{BenchConfig, DriverConfig};
use crate::driver::EscDriver;
use crate::dshot::protocol::{Channel, EscCommand, NUM_CHANNELS};
use crate::throttle::FlightState;

/// Monotonic microsecond time source
#[cfg_attr(test, mockall::automock)]
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin
    fn now_us(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Outcome of one bench cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Cycle number, starting at 1
    pub cycle: u64,
    /// Time since the bench started
    pub elapsed_us: u64,
    /// Flags applied this cycle
    pub state: FlightState,
    /// Throttle values encoded per channel
    pub values: [u16; NUM_CHANNELS],
    /// Beep command sent after the throttle frames, if any
    pub beep: Option<EscCommand>,
}

/// Scripted control loop around an [`EscDriver`]
#[derive(Debug)]
pub struct Bench<C: Clock, P: BitBangPort> {
    clock: C,
    driver: EscDriver<P>,
    script: BenchConfig,
    started_at: u64,
    elapsed_us: u64,
    cycles: u64,
}

impl<C: Clock, P: BitBangPort> Bench<C, P> {
    /// Create a bench; the clock is read once to set the start time
    ///
    /// # Arguments
    ///
    /// * `clock` - Time source
    /// * `port` - Output port handed to the driver
    /// * `driver_config` - Resolved driver settings
    /// * `script` - Bench script
    pub fn new(clock: C, port: P, driver_config: DriverConfig, script: BenchConfig) -> Self {
        let started_at = clock.now_us();
        let mut driver = EscDriver::new(driver_config, port, started_at);
        driver.set_direction(script.direction);

        info!(
            "Bench script: throttle={:.3}, direction={:?}, on_ground={}, failsafe_after_ms={:?}",
            script.throttle, script.direction, script.on_ground, script.failsafe_after_ms
        );

        Self {
            clock,
            driver,
            script,
            started_at,
            elapsed_us: 0,
            cycles: 0,
        }
    }

    /// Flight flags the script prescribes at a given time since start
    pub fn scripted_state(&self, elapsed_us: u64) -> FlightState {
        let failsafe = self
            .script
            .failsafe_after_ms
            .map_or(false, |after_ms| elapsed_us >= after_ms.saturating_mul(1000));

        FlightState {
            on_ground: self.script.on_ground,
            failsafe,
        }
    }

    /// Run one control cycle: throttle on all channels, then the beep check
    pub fn cycle(&mut self) -> CycleReport {
        let now = self.clock.now_us();
        self.elapsed_us = now.wrapping_sub(self.started_at);
        let state = self.scripted_state(self.elapsed_us);

        let mut values = [0; NUM_CHANNELS];
        for channel in Channel::ALL {
            values[channel.index()] =
                self.driver.set_throttle(channel, self.script.throttle, &state, now);
        }
        let beep = self.driver.beep(state.failsafe, now);

        self.cycles += 1;

        CycleReport {
            cycle: self.cycles,
            elapsed_us: self.elapsed_us,
            state,
            values,
            beep,
        }
    }

    /// Whether the scripted duration has run out (never, when it is 0)
    pub fn is_finished(&self) -> bool {
        self.script.duration_ms != 0
            && self.elapsed_us >= self.script.duration_ms.saturating_mul(1000)
    }

    /// Cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Underlying driver
    pub fn driver(&self) -> &EscDriver<P> {
        &self.driver
    }

    /// Mutable underlying driver
    pub fn driver_mut(&mut self) -> &mut EscDriver<P> {
        &mut self.driver
    }
}
