//! # Beep Sequencer
//!
//! Makes the motors beep after a prolonged failsafe so a lost craft can be
//! found by ear.
//!
//! ## States
//!
//! ```text
//! Inactive --failsafe--> Waiting --timeout elapsed--> Beeping
//!    ^                      |                            |
//!    +------ failsafe clears (timer reset) --------------+
//! ```
//!
//! ## Pattern
//!
//! While beeping, the time since failsafe onset modulo 2 s selects a command:
//!
//! | Window | Command |
//! |--------|---------|
//! | 0-250 ms | Beep1 |
//! | 250-500 ms | Beep3 |
//! | 500-750 ms | Beep2 |
//! | 750-1000 ms | Beep4 |
//! | 1000-2000 ms | silence |
//!
//! The Beep3/Beep2 swap is the order the ESCs have always been sent; it is
//! kept as is.

use tracing::{info, warn};

use crate::dshot::protocol::EscCommand;

/// Length of one full beep pattern
pub const BEEP_CYCLE_US: u64 = 2_000_000;

/// Length of one beep window
pub const BEEP_WINDOW_US: u64 = 250_000;

/// Commands sent in successive windows at the start of each cycle
pub const BEEP_PATTERN: [EscCommand; 4] = [
    EscCommand::Beep1,
    EscCommand::Beep3,
    EscCommand::Beep2,
    EscCommand::Beep4,
];

/// Sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepState {
    /// Link healthy
    Inactive,
    /// Failsafe active, timeout not yet reached
    Waiting,
    /// Failsafe held past the timeout
    Beeping,
}

/// Failsafe-driven beep state machine
#[derive(Debug, Clone)]
pub struct BeepSequencer {
    timeout_us: u64,
    /// Failsafe onset; independent from the throttle mapper's latch
    started_at: Option<u64>,
    state: BeepState,
}

impl BeepSequencer {
    /// Create an inactive sequencer
    ///
    /// # Arguments
    ///
    /// * `timeout_us` - Failsafe duration before beeping starts
    pub fn new(timeout_us: u64) -> Self {
        Self {
            timeout_us,
            started_at: None,
            state: BeepState::Inactive,
        }
    }

    /// Advance the state machine by one control cycle
    ///
    /// # Arguments
    ///
    /// * `failsafe` - Current failsafe flag
    /// * `now_us` - Current monotonic time in microseconds
    ///
    /// # Returns
    ///
    /// * `Option<EscCommand>` - Beep command to send this cycle, if any
    ///
    /// # Examples
    ///
    /// ```
    /// use esc_bitbang::beep::BeepSequencer;
    /// use esc_bitbang::dshot::protocol::EscCommand;
    ///
    /// let mut beeper = BeepSequencer::new(5_000_000);
    /// assert_eq!(beeper.tick(true, 0), None);
    /// assert_eq!(beeper.tick(true, 6_100_000), Some(EscCommand::Beep1));
    /// ```
    pub fn tick(&mut self, failsafe: bool, now_us: u64) -> Option<EscCommand> {
        if !failsafe {
            if self.state != BeepState::Inactive {
                info!("Failsafe cleared, motor beeps stopped");
            }
            self.started_at = None;
            self.state = BeepState::Inactive;
            return None;
        }

        let started_at = *self.started_at.get_or_insert(now_us);
        let elapsed = now_us.wrapping_sub(started_at);

        match self.state {
            BeepState::Inactive => {
                info!("Failsafe active, motor beeps in {} ms", self.timeout_us / 1000);
                self.state = BeepState::Waiting;
            }
            BeepState::Waiting if elapsed > self.timeout_us => {
                warn!("Failsafe held for {} ms, beeping motors", elapsed / 1000);
                self.state = BeepState::Beeping;
            }
            _ => {}
        }

        if self.state == BeepState::Beeping {
            pattern_command(elapsed)
        } else {
            None
        }
    }

    /// Current state
    pub fn state(&self) -> BeepState {
        self.state
    }

    /// Failsafe onset timestamp, if timing
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }
}

/// Beep command for a given time since failsafe onset
///
/// Returns `None` during the silent second half of each cycle.
pub fn pattern_command(elapsed_us: u64) -> Option<EscCommand> {
    let window = (elapsed_us % BEEP_CYCLE_US / BEEP_WINDOW_US) as usize;
    BEEP_PATTERN.get(window).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: u64 = 5_000_000;

    fn beeping_at(elapsed_us: u64) -> Option<EscCommand> {
        let mut beeper = BeepSequencer::new(TIMEOUT);
        beeper.tick(true, 1_000);
        beeper.tick(true, 1_000 + elapsed_us)
    }

    #[test]
    fn test_inactive_without_failsafe() {
        let mut beeper = BeepSequencer::new(TIMEOUT);
        assert_eq!(beeper.tick(false, 10_000_000), None);
        assert_eq!(beeper.state(), BeepState::Inactive);
        assert_eq!(beeper.started_at(), None);
    }

    #[test]
    fn test_failsafe_onset_starts_waiting() {
        let mut beeper = BeepSequencer::new(TIMEOUT);
        assert_eq!(beeper.tick(true, 42), None);
        assert_eq!(beeper.state(), BeepState::Waiting);
        assert_eq!(beeper.started_at(), Some(42));
    }

    #[test]
    fn test_no_beep_before_timeout() {
        let mut beeper = BeepSequencer::new(TIMEOUT);
        beeper.tick(true, 0);
        for t in (0..=TIMEOUT).step_by(50_000) {
            assert_eq!(beeper.tick(true, t), None, "beeped at {} us", t);
        }
        assert_eq!(beeper.state(), BeepState::Waiting);
    }

    #[test]
    fn test_beeping_after_timeout() {
        let mut beeper = BeepSequencer::new(TIMEOUT);
        beeper.tick(true, 0);
        beeper.tick(true, TIMEOUT + 1);
        assert_eq!(beeper.state(), BeepState::Beeping);
    }

    #[test]
    fn test_pattern_order() {
        // 5 s timeout is odd, so the first window opens at 6 s
        assert_eq!(beeping_at(5_100_000), None);
        assert_eq!(beeping_at(6_100_000), Some(EscCommand::Beep1));
        assert_eq!(beeping_at(6_300_000), Some(EscCommand::Beep3));
        assert_eq!(beeping_at(6_600_000), Some(EscCommand::Beep2));
        assert_eq!(beeping_at(6_900_000), Some(EscCommand::Beep4));
        assert_eq!(beeping_at(7_100_000), None);
        assert_eq!(beeping_at(7_950_000), None);
        assert_eq!(beeping_at(8_000_000), Some(EscCommand::Beep1));
    }

    #[test]
    fn test_pattern_command_windows() {
        assert_eq!(pattern_command(0), Some(EscCommand::Beep1));
        assert_eq!(pattern_command(249_999), Some(EscCommand::Beep1));
        assert_eq!(pattern_command(250_000), Some(EscCommand::Beep3));
        assert_eq!(pattern_command(500_000), Some(EscCommand::Beep2));
        assert_eq!(pattern_command(999_999), Some(EscCommand::Beep4));
        assert_eq!(pattern_command(1_000_000), None);
        assert_eq!(pattern_command(1_999_999), None);
        assert_eq!(pattern_command(2_000_000), Some(EscCommand::Beep1));
    }

    #[test]
    fn test_failsafe_clear_resets() {
        let mut beeper = BeepSequencer::new(TIMEOUT);
        beeper.tick(true, 0);
        assert_eq!(beeper.tick(true, 6_000_000), Some(EscCommand::Beep1));
        assert_eq!(beeper.tick(false, 6_001_000), None);
        assert_eq!(beeper.state(), BeepState::Inactive);
        assert_eq!(beeper.started_at(), None);

        // new episode waits the full timeout again
        assert_eq!(beeper.tick(true, 7_000_000), None);
        assert_eq!(beeper.tick(true, 10_000_000), None);
        assert_eq!(beeper.state(), BeepState::Waiting);
    }

    #[test]
    fn test_custom_timeout() {
        let mut beeper = BeepSequencer::new(2_000_000);
        beeper.tick(true, 0);
        assert_eq!(beeper.tick(true, 2_000_000), None);
        assert_eq!(beeper.tick(true, 2_000_001), Some(EscCommand::Beep1));
    }
}
