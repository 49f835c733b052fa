//! # Configuration Module
//!
//! The resolved [`DriverConfig`] the ESC driver is built from, and (with the
//! `std` feature) loading and validating the TOML configuration file.
//!
//! The bit-rate profile is deliberately absent from both: it is fixed at
//! build time by the `dshot150` / `dshot300` cargo features because the
//! transmitter's delay counts are compile-time constants.

#[cfg(feature = "std")]
mod file;

#[cfg(feature = "std")]
pub use file::{BenchConfig, CaptureConfig, Config, DshotConfig, LoggingConfig};

/// Default idle offset added to the lowest throttle value
pub const DEFAULT_IDLE_OFFSET: u16 = 40;

/// Largest idle offset that leaves a non-empty bidirectional range
pub const IDLE_OFFSET_MAX: u16 = 999;

/// Largest idle offset whose unidirectional full throttle still fits in
/// 11 bits (`48 + 2 * offset + floor(0.999 * (2001 - 2 * offset)) <= 2047`)
pub const IDLE_OFFSET_MAX_UNIDIRECTIONAL: u16 = 500;

/// Default time in failsafe before motors start beeping
pub const DEFAULT_BEEP_TIMEOUT_MS: u64 = 5_000;

/// Default time in failsafe before output is cut to zero
pub const DEFAULT_FAILSAFE_CUTOFF_MS: u64 = 100;

/// Driver settings resolved once at startup.
///
/// `Default` follows the `bidirectional` cargo feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Forward/reverse split of the value range (3D mode)
    pub bidirectional: bool,
    /// Added to the lowest throttle value so motors keep spinning
    pub idle_offset: u16,
    /// Failsafe duration before beeping starts
    pub beep_timeout_us: u64,
    /// Failsafe duration before output is forced to zero
    pub failsafe_cutoff_us: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            bidirectional: cfg!(feature = "bidirectional"),
            idle_offset: DEFAULT_IDLE_OFFSET,
            beep_timeout_us: DEFAULT_BEEP_TIMEOUT_MS * 1000,
            failsafe_cutoff_us: DEFAULT_FAILSAFE_CUTOFF_MS * 1000,
        }
    }
}

impl DriverConfig {
    /// Largest usable idle offset for this direction mode
    pub fn idle_offset_max(&self) -> u16 {
        if self.bidirectional {
            IDLE_OFFSET_MAX
        } else {
            IDLE_OFFSET_MAX_UNIDIRECTIONAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_config_default() {
        let driver = DriverConfig::default();
        assert_eq!(driver.idle_offset, 40);
        assert_eq!(driver.beep_timeout_us, 5_000_000);
        assert_eq!(driver.failsafe_cutoff_us, 100_000);
        assert_eq!(driver.bidirectional, cfg!(feature = "bidirectional"));
    }

    #[test]
    fn test_default_idle_offset_in_range() {
        assert!(DEFAULT_IDLE_OFFSET <= IDLE_OFFSET_MAX);
        assert!(DEFAULT_IDLE_OFFSET <= IDLE_OFFSET_MAX_UNIDIRECTIONAL);
    }

    #[test]
    fn test_idle_offset_max_per_mode() {
        let bidirectional = DriverConfig { bidirectional: true, ..DriverConfig::default() };
        let unidirectional = DriverConfig { bidirectional: false, ..DriverConfig::default() };
        assert_eq!(bidirectional.idle_offset_max(), 999);
        assert_eq!(unidirectional.idle_offset_max(), 500);
    }
}
