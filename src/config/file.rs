//! # Configuration File
//!
//! Loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::{
    DriverConfig, DEFAULT_BEEP_TIMEOUT_MS, DEFAULT_FAILSAFE_CUTOFF_MS, DEFAULT_IDLE_OFFSET,
};
use crate::dshot::protocol::Direction;
use crate::error::{EscError, Result};

/// Longest scripted delay or bench duration (one day)
pub const BENCH_TIME_MAX_MS: u64 = 86_400_000;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub dshot: DshotConfig,
    #[serde(default)]
    pub bench: BenchConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// DShot driver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DshotConfig {
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,

    #[serde(default = "default_idle_offset")]
    pub idle_offset: u16,

    #[serde(default = "default_beep_timeout_ms")]
    pub beep_timeout_ms: u64,

    #[serde(default = "default_failsafe_cutoff_ms")]
    pub failsafe_cutoff_ms: u64,
}

/// Bench run configuration (simulated control loop)
#[derive(Debug, Deserialize, Clone)]
pub struct BenchConfig {
    #[serde(default = "default_loop_rate_hz")]
    pub loop_rate_hz: u32,

    #[serde(default = "default_throttle")]
    pub throttle: f32,

    #[serde(default)]
    pub direction: Direction,

    #[serde(default)]
    pub on_ground: bool,

    /// Simulate link loss this long after start
    #[serde(default)]
    pub failsafe_after_ms: Option<u64>,

    /// Stop after this long; 0 runs until Ctrl+C
    #[serde(default)]
    pub duration_ms: u64,

    #[serde(default = "default_core_clock_hz")]
    pub core_clock_hz: u32,
}

/// Capture log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_capture_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

// Default value functions
fn default_bidirectional() -> bool { cfg!(feature = "bidirectional") }
fn default_idle_offset() -> u16 { DEFAULT_IDLE_OFFSET }
fn default_beep_timeout_ms() -> u64 { DEFAULT_BEEP_TIMEOUT_MS }
fn default_failsafe_cutoff_ms() -> u64 { DEFAULT_FAILSAFE_CUTOFF_MS }

fn default_loop_rate_hz() -> u32 { 1000 }
fn default_throttle() -> f32 { 0.0 }
fn default_core_clock_hz() -> u32 { 48_000_000 }

fn default_capture_dir() -> String { "./captures".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for DshotConfig {
    fn default() -> Self {
        Self {
            bidirectional: default_bidirectional(),
            idle_offset: default_idle_offset(),
            beep_timeout_ms: default_beep_timeout_ms(),
            failsafe_cutoff_ms: default_failsafe_cutoff_ms(),
        }
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            loop_rate_hz: default_loop_rate_hz(),
            throttle: default_throttle(),
            direction: Direction::default(),
            on_ground: false,
            failsafe_after_ms: None,
            duration_ms: 0,
            core_clock_hz: default_core_clock_hz(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_capture_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl DshotConfig {
    /// Resolve into the driver settings
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            bidirectional: self.bidirectional,
            idle_offset: self.idle_offset,
            beep_timeout_us: self.beep_timeout_ms * 1000,
            failsafe_cutoff_us: self.failsafe_cutoff_ms * 1000,
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> EscError {
    EscError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use esc_bitbang::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Bidirectional span is 1000 - idle_offset, unidirectional 2001 - 2 * idle_offset
        let idle_offset_max = self.dshot.driver_config().idle_offset_max();
        if self.dshot.idle_offset > idle_offset_max {
            return Err(invalid(format!(
                "idle_offset must be at most {} in this direction mode",
                idle_offset_max
            )));
        }

        if self.dshot.beep_timeout_ms == 0 || self.dshot.beep_timeout_ms > 600_000 {
            return Err(invalid("beep_timeout_ms must be between 1 and 600000"));
        }

        if self.dshot.failsafe_cutoff_ms == 0 || self.dshot.failsafe_cutoff_ms > 10_000 {
            return Err(invalid("failsafe_cutoff_ms must be between 1 and 10000"));
        }

        if ![500, 1000, 2000, 4000, 8000].contains(&self.bench.loop_rate_hz) {
            return Err(invalid("loop_rate_hz must be one of: 500, 1000, 2000, 4000, 8000"));
        }

        if !(0.0..=1.0).contains(&self.bench.throttle) {
            return Err(invalid("throttle must be between 0.0 and 1.0"));
        }

        if matches!(self.bench.failsafe_after_ms, Some(ms) if ms > BENCH_TIME_MAX_MS) {
            return Err(invalid("failsafe_after_ms must be at most 86400000"));
        }

        if self.bench.duration_ms > BENCH_TIME_MAX_MS {
            return Err(invalid("duration_ms must be at most 86400000"));
        }

        if self.bench.core_clock_hz < 1_000_000 {
            return Err(invalid("core_clock_hz must be at least 1000000"));
        }

        if self.capture.enabled && self.capture.log_dir.is_empty() {
            return Err(invalid("capture log_dir cannot be empty when enabled"));
        }

        if self.capture.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.capture.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if matches!(&self.logging.log_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging log_dir cannot be empty when set"));
        }

        Ok(())
    }
}
