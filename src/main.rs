//! # ESC Bitbang Bench
//!
//! Runs the bit-banged DShot driver against a simulated pin bank and checks
//! what comes out of the pins.
//!
//! The bench plays the `[bench]` script from the configuration (throttle,
//! direction, optional link loss) at the configured loop rate. Every cycle the
//! emitted edges are decoded back into frames, checked, and optionally written
//! to the JSONL capture log.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use esc_bitbang::bench::{Bench, MonotonicClock};
use esc_bitbang::bitbang::analyzer::{CycleModel, LogicAnalyzer};
use esc_bitbang::capture::{CaptureLog, CaptureRecord};
use esc_bitbang::config::{Config, LoggingConfig};
use esc_bitbang::dshot::protocol::{BitRate, NUM_CHANNELS};

/// Environment variable naming the configuration file
const CONFIG_ENV: &str = "ESC_BITBANG_CONFIG";

/// Configuration file used when the environment variable is unset
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Seconds between status log messages
const STATUS_INTERVAL_SECS: u64 = 5;

/// Main entry point for the ESC bench
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (`ESC_BITBANG_CONFIG`, else `config/default.toml`,
///      else built-in defaults)
///    - Set up logging to the console and, if configured, a daily log file
///    - Build the driver on a cycle-counting logic analyzer
///
/// 2. **Main Loop**
///    - Run one control cycle per tick at `loop_rate_hz`
///    - Decode the captured edges and count checksum failures
///    - Append the decoded cycle to the capture log when enabled
///    - Log status every few seconds
///
/// 3. **Shutdown**
///    - On Ctrl+C or after `duration_ms`
///    - Flush the capture log and log totals
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug ESC_BITBANG_CONFIG=config/default.toml cargo run --release
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path(
        std::env::var_os(CONFIG_ENV),
        Path::new(DEFAULT_CONFIG_PATH).exists(),
    );
    let config = load_config(config_path.as_deref())?;

    let _log_guard = init_logging(&config.logging);

    info!("ESC Bitbang v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file, using defaults"),
    }

    let driver_config = config.dshot.driver_config();
    let model = CycleModel::GD32F130.with_clock(config.bench.core_clock_hz);
    info!(
        "{} on {} ESC channels, core clock {} MHz, bidirectional={}",
        BitRate::COMPILED.name(),
        NUM_CHANNELS,
        model.clock_hz / 1_000_000,
        driver_config.bidirectional
    );

    let mut bench = Bench::new(
        MonotonicClock::new(),
        LogicAnalyzer::new(model),
        driver_config,
        config.bench.clone(),
    );

    let mut capture_log = if config.capture.enabled {
        Some(CaptureLog::open(&config.capture).context("Failed to open capture log")?)
    } else {
        None
    };

    let loop_rate_hz = config.bench.loop_rate_hz;
    let mut ticker = interval(loop_period(loop_rate_hz));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let status_every = status_interval_cycles(loop_rate_hz);

    info!("Starting control loop at {}Hz", loop_rate_hz);
    info!("Press Ctrl+C to exit");

    let mut invalid_frames: u64 = 0;
    let mut beeps: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = bench.cycle();
                let capture = bench.driver_mut().port_mut().take_capture();
                let record = CaptureRecord::new(&report, &capture);

                if !record.all_valid() {
                    invalid_frames += 1;
                    warn!("Cycle {}: captured frame failed checksum", report.cycle);
                }
                if report.beep.is_some() {
                    beeps += 1;
                }

                if let Some(log) = capture_log.as_mut() {
                    if let Err(e) = log.write(&record) {
                        warn!("Failed to write capture record: {}", e);
                    }
                }

                if report.cycle % status_every == 0 {
                    info!(
                        "Cycle {}: values {:?}, failsafe={}, beep={:?}, slot period {:.1} ns",
                        report.cycle,
                        report.values,
                        report.state.failsafe,
                        report.beep,
                        record.slot_period_ns.unwrap_or_default()
                    );
                }

                if bench.is_finished() {
                    info!("Bench duration of {} ms reached", config.bench.duration_ms);
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Some(log) = capture_log.as_mut() {
        log.flush().context("Failed to flush capture log")?;
    }

    info!(
        "Total cycles: {}, beep frames: {}, checksum failures: {}",
        bench.cycles(),
        beeps,
        invalid_frames
    );

    Ok(())
}

/// Pick the configuration file: explicit path, else the default if present
fn resolve_config_path(from_env: Option<OsString>, default_exists: bool) -> Option<PathBuf> {
    match from_env {
        Some(path) => Some(PathBuf::from(path)),
        None if default_exists => Some(PathBuf::from(DEFAULT_CONFIG_PATH)),
        None => None,
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Console logging plus an optional daily rolling file
///
/// The returned guard must be held until exit so buffered file output is
/// flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "esc-bitbang.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn loop_period(loop_rate_hz: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(loop_rate_hz.max(1)))
}

fn status_interval_cycles(loop_rate_hz: u32) -> u64 {
    (u64::from(loop_rate_hz) * STATUS_INTERVAL_SECS).max(1)
}
