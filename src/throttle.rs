//! # Throttle Mapper
//!
//! Converts a normalized throttle (0.0-1.0) into the 11-bit DShot value and
//! applies the on-ground and failsafe output policies.
//!
//! ## Value Ranges
//!
//! | Mode | Direction | Range |
//! |------|-----------|-------|
//! | Bidirectional | Forward | `48 + idle_offset ..= 1047` |
//! | Bidirectional | Reverse | `1048 + idle_offset ..= 2047` |
//! | Unidirectional | (ignored) | `48 + 2 * idle_offset ..= 2047` |
//!
//! The input is clamped to `0.0..=0.999` so the top of each range is hit
//! exactly without spilling into the next one.
//!
//! ## Failsafe
//!
//! The first cycle that sees failsafe latches a timestamp. Once failsafe has
//! been held for longer than the cutoff (100 ms by default) the value is
//! forced to 0, which stops the ESCs and lets them be reflashed safely.
//! Clearing failsafe resets the latch.

use tracing::{info, warn};

use crate::config::DriverConfig;
use crate::dshot::protocol::{Direction, DSHOT_REVERSE_MIN, DSHOT_THROTTLE_MIN};

/// Largest accepted normalized throttle
pub const THROTTLE_INPUT_MAX: f32 = 0.999;

/// Width of one direction's range in bidirectional mode
const BIDIRECTIONAL_SPAN: u16 = 1000;

/// Width of the full range in unidirectional mode
const UNIDIRECTIONAL_SPAN: u16 = 2001;

/// Externally owned flight flags, read once per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlightState {
    /// Craft is on the ground: motors must be stopped
    pub on_ground: bool,
    /// Command link lost
    pub failsafe: bool,
}

/// Maps throttle to DShot values and tracks the failsafe latch
#[derive(Debug, Clone)]
pub struct ThrottleMapper {
    bidirectional: bool,
    idle_offset: u16,
    cutoff_us: u64,
    /// When failsafe was first seen, `None` while the link is healthy
    failsafe_since: Option<u64>,
    cutoff_engaged: bool,
}

impl ThrottleMapper {
    /// Create a mapper with output suppressed until the link is confirmed
    ///
    /// The latch is primed as if failsafe began one full cutoff ago, so a
    /// failsafe that is already active on the first cycle cuts the output
    /// immediately instead of running motors for the cutoff period.
    ///
    /// # Arguments
    ///
    /// * `config` - Resolved driver settings
    /// * `now_us` - Current monotonic time in microseconds
    ///
    /// An idle offset above [`DriverConfig::idle_offset_max`] is clamped to it.
    pub fn new(config: &DriverConfig, now_us: u64) -> Self {
        let idle_offset_max = config.idle_offset_max();
        if config.idle_offset > idle_offset_max {
            warn!(
                "idle_offset {} out of range, clamped to {}",
                config.idle_offset, idle_offset_max
            );
        }

        Self {
            bidirectional: config.bidirectional,
            idle_offset: config.idle_offset.min(idle_offset_max),
            cutoff_us: config.failsafe_cutoff_us,
            failsafe_since: Some(now_us.wrapping_sub(config.failsafe_cutoff_us.wrapping_add(1))),
            cutoff_engaged: false,
        }
    }

    /// Scale a normalized throttle into the DShot value range
    ///
    /// Pure function of the input; no ground or failsafe handling.
    ///
    /// # Examples
    ///
    /// ```
    /// use esc_bitbang::config::DriverConfig;
    /// use esc_bitbang::dshot::protocol::Direction;
    /// use esc_bitbang::throttle::ThrottleMapper;
    ///
    /// let config = DriverConfig { bidirectional: true, ..DriverConfig::default() };
    /// let mapper = ThrottleMapper::new(&config, 0);
    /// assert_eq!(mapper.scale(0.0, Direction::Forward), 88);
    /// assert_eq!(mapper.scale(1.0, Direction::Forward), 1047);
    /// assert_eq!(mapper.scale(1.0, Direction::Reverse), 2047);
    /// ```
    pub fn scale(&self, throttle: f32, direction: Direction) -> u16 {
        let throttle = if throttle.is_nan() {
            0.0
        } else {
            throttle.clamp(0.0, THROTTLE_INPUT_MAX)
        };

        if self.bidirectional {
            let base = match direction {
                Direction::Forward => DSHOT_THROTTLE_MIN,
                Direction::Reverse => DSHOT_REVERSE_MIN,
            };
            let span = BIDIRECTIONAL_SPAN.saturating_sub(self.idle_offset);
            base + self.idle_offset + (throttle * span as f32) as u16
        } else {
            let idle = self.idle_offset * 2;
            let span = UNIDIRECTIONAL_SPAN.saturating_sub(idle);
            DSHOT_THROTTLE_MIN + idle + (throttle * span as f32) as u16
        }
    }

    /// Compute the value to send this cycle
    ///
    /// # Arguments
    ///
    /// * `throttle` - Normalized throttle, clamped to `0.0..=0.999`
    /// * `direction` - Motor direction (bidirectional mode only)
    /// * `state` - On-ground and failsafe flags
    /// * `now_us` - Current monotonic time in microseconds
    ///
    /// # Returns
    ///
    /// * `u16` - 11-bit value, 0 when output is suppressed
    pub fn map(
        &mut self,
        throttle: f32,
        direction: Direction,
        state: &FlightState,
        now_us: u64,
    ) -> u16 {
        let mut value = self.scale(throttle, direction);

        if state.on_ground {
            value = 0;
        }

        if state.failsafe {
            match self.failsafe_since {
                None => self.failsafe_since = Some(now_us),
                Some(since) => {
                    if now_us.wrapping_sub(since) > self.cutoff_us {
                        if !self.cutoff_engaged {
                            warn!(
                                "Failsafe held for over {} ms, cutting ESC output",
                                self.cutoff_us / 1000
                            );
                            self.cutoff_engaged = true;
                        }
                        value = 0;
                    }
                }
            }
        } else {
            if self.cutoff_engaged {
                info!("Failsafe cleared, ESC output restored");
                self.cutoff_engaged = false;
            }
            self.failsafe_since = None;
        }

        value
    }

    /// Whether the failsafe cutoff is currently forcing zero output
    pub fn cutoff_engaged(&self) -> bool {
        self.cutoff_engaged
    }

    /// Timestamp latched at failsafe onset
    pub fn failsafe_since(&self) -> Option<u64> {
        self.failsafe_since
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK_OK: FlightState = FlightState { on_ground: false, failsafe: false };
    const LINK_LOST: FlightState = FlightState { on_ground: false, failsafe: true };

    fn mapper(bidirectional: bool) -> ThrottleMapper {
        let config = DriverConfig {
            bidirectional,
            ..DriverConfig::default()
        };
        ThrottleMapper::new(&config, 0)
    }

    #[test]
    fn test_bidirectional_forward_range() {
        let m = mapper(true);
        assert_eq!(m.scale(0.0, Direction::Forward), 48 + 40);
        assert_eq!(m.scale(0.999, Direction::Forward), 1047);
    }

    #[test]
    fn test_bidirectional_reverse_range() {
        let m = mapper(true);
        assert_eq!(m.scale(0.0, Direction::Reverse), 1048 + 40);
        assert_eq!(m.scale(0.999, Direction::Reverse), 2047);
    }

    #[test]
    fn test_unidirectional_range_ignores_direction() {
        let m = mapper(false);
        assert_eq!(m.scale(0.0, Direction::Forward), 48 + 80);
        assert_eq!(m.scale(0.999, Direction::Forward), 2047);
        assert_eq!(m.scale(0.5, Direction::Reverse), m.scale(0.5, Direction::Forward));
    }

    #[test]
    fn test_input_is_clamped() {
        let m = mapper(true);
        assert_eq!(m.scale(-3.0, Direction::Forward), m.scale(0.0, Direction::Forward));
        assert_eq!(m.scale(7.0, Direction::Forward), 1047);
        assert_eq!(m.scale(f32::NAN, Direction::Forward), 88);
    }

    #[test]
    fn test_scale_is_monotonic() {
        for bidirectional in [true, false] {
            let m = mapper(bidirectional);
            for direction in [Direction::Forward, Direction::Reverse] {
                let mut last = 0u16;
                for step in 0..=1000 {
                    let value = m.scale(step as f32 / 1000.0, direction);
                    assert!(value >= last, "not monotonic at step {}", step);
                    last = value;
                }
            }
        }
    }

    #[test]
    fn test_ranges_do_not_overlap() {
        let m = mapper(true);
        assert!(m.scale(1.0, Direction::Forward) < m.scale(0.0, Direction::Reverse));
    }

    #[test]
    fn test_on_ground_stops_motors() {
        let mut m = mapper(true);
        let state = FlightState { on_ground: true, failsafe: false };
        for step in 0..=10 {
            assert_eq!(m.map(step as f32 / 10.0, Direction::Forward, &state, 1_000), 0);
            assert_eq!(m.map(step as f32 / 10.0, Direction::Reverse, &state, 1_000), 0);
        }
    }

    #[test]
    fn test_failsafe_at_power_on_cuts_immediately() {
        let mut m = mapper(true);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 0), 0);
        assert!(m.cutoff_engaged());
    }

    #[test]
    fn test_healthy_link_at_power_on_resets_latch() {
        let mut m = mapper(true);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_OK, 0), m.scale(0.5, Direction::Forward));
        assert_eq!(m.failsafe_since(), None);
    }

    #[test]
    fn test_failsafe_cutoff_after_100ms() {
        let mut m = mapper(true);
        let expected = m.scale(0.5, Direction::Forward);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_OK, 1_000_000), expected);

        // onset latches, value still sent
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 2_000_000), expected);
        assert_eq!(m.failsafe_since(), Some(2_000_000));
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 2_050_000), expected);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 2_100_000), expected);

        // past 100 ms the output is cut
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 2_100_001), 0);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 5_000_000), 0);
    }

    #[test]
    fn test_failsafe_clear_restores_output() {
        let mut m = mapper(true);
        m.map(0.5, Direction::Forward, &LINK_OK, 0);
        m.map(0.5, Direction::Forward, &LINK_LOST, 1_000);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 500_000), 0);

        let expected = m.scale(0.5, Direction::Forward);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_OK, 500_100), expected);
        assert!(!m.cutoff_engaged());

        // a new episode starts a fresh latch
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 600_000), expected);
        assert_eq!(m.failsafe_since(), Some(600_000));
    }

    #[test]
    fn test_failsafe_latch_survives_clock_wrap() {
        let mut m = mapper(true);
        m.map(0.5, Direction::Forward, &LINK_OK, 0);
        let start = u64::MAX - 10_000;
        assert_ne!(m.map(0.5, Direction::Forward, &LINK_LOST, start), 0);
        assert_eq!(m.map(0.5, Direction::Forward, &LINK_LOST, 200_000), 0);
    }

    #[test]
    fn test_custom_idle_offset() {
        let config = DriverConfig {
            bidirectional: false,
            idle_offset: 0,
            ..DriverConfig::default()
        };
        let m = ThrottleMapper::new(&config, 0);
        assert_eq!(m.scale(0.0, Direction::Forward), 48);
        assert_eq!(m.scale(0.999, Direction::Forward), 48 + 1998);
    }

    #[test]
    fn test_oversized_idle_offset_is_clamped() {
        // built directly, without going through config validation
        for idle_offset in [1001, u16::MAX] {
            let config = DriverConfig {
                bidirectional: true,
                idle_offset,
                ..DriverConfig::default()
            };
            let m = ThrottleMapper::new(&config, 0);
            assert_eq!(m.scale(0.0, Direction::Forward), 48 + 999);
            assert_eq!(m.scale(0.5, Direction::Forward), 1047);
            assert_eq!(m.scale(0.999, Direction::Reverse), 2047);
        }
    }

    #[test]
    fn test_unidirectional_full_throttle_fits_11_bits() {
        for idle_offset in [500, 501, 999, 1001] {
            let config = DriverConfig {
                bidirectional: false,
                idle_offset,
                ..DriverConfig::default()
            };
            let m = ThrottleMapper::new(&config, 0);
            assert_eq!(m.scale(0.999, Direction::Forward), 2047);
        }
    }
}
