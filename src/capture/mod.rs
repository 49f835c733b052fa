//! # Capture Module
//!
//! Logs what the pins actually emitted to JSONL files with rotation.
//!
//! This module handles:
//! - Turning a logic-analyzer [`Capture`] into decoded per-channel frames
//! - Formatting each cycle as one JSON line, timestamped in RFC 3339
//! - Starting a new file after `max_records_per_file` records
//! - Retaining only the newest `max_files_to_keep` files
//!
//! ## Record format
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00.000Z","cycle":42,"elapsed_us":41000,"on_ground":false,
//!  "failsafe":false,"beep":null,"slot_period_ns":833.3,
//!  "channels":[{"channel":"ESC1",
//!    "frames":[{"raw":3300,"value":206,"telemetry":false,"valid":true}]},...]}
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bench::CycleReport;
use crate::bitbang::analyzer::Capture;
use crate::config::CaptureConfig;
use crate::dshot::protocol::{Channel, Frame};
use crate::error::Result;

const FILE_PREFIX: &str = "capture_";
const FILE_EXTENSION: &str = "jsonl";

/// One decoded frame
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FrameRecord {
    pub raw: u16,
    pub value: u16,
    pub telemetry: bool,
    pub valid: bool,
}

impl From<Frame> for FrameRecord {
    fn from(frame: Frame) -> Self {
        Self {
            raw: frame.raw(),
            value: frame.value(),
            telemetry: frame.telemetry(),
            valid: frame.is_valid(),
        }
    }
}

/// Frames seen on one channel during a cycle
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChannelRecord {
    pub channel: String,
    pub frames: Vec<FrameRecord>,
}

/// One line of the capture log
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaptureRecord {
    pub timestamp: String,
    pub cycle: u64,
    pub elapsed_us: u64,
    pub on_ground: bool,
    pub failsafe: bool,
    pub beep: Option<String>,
    pub slot_period_ns: Option<f64>,
    pub channels: Vec<ChannelRecord>,
}

impl CaptureRecord {
    /// Build a record from a bench cycle and the edges it produced
    pub fn new(report: &CycleReport, capture: &Capture) -> Self {
        let decoded = capture.decode_all();
        let channels = Channel::ALL
            .into_iter()
            .zip(decoded)
            .map(|(channel, frames)| ChannelRecord {
                channel: channel.to_string(),
                frames: frames.into_iter().map(FrameRecord::from).collect(),
            })
            .collect();

        Self {
            timestamp: Utc::now().to_rfc3339(),
            cycle: report.cycle,
            elapsed_us: report.elapsed_us,
            on_ground: report.state.on_ground,
            failsafe: report.state.failsafe,
            beep: report.beep.map(|command| format!("{:?}", command)),
            slot_period_ns: capture.slot_period_ns(),
            channels,
        }
    }

    /// Whether every decoded frame carried a valid checksum
    pub fn all_valid(&self) -> bool {
        self.channels
            .iter()
            .flat_map(|c| c.frames.iter())
            .all(|f| f.valid)
    }
}

/// Rotating JSONL writer for [`CaptureRecord`]s
#[derive(Debug)]
pub struct CaptureLog {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    files_opened: u64,
}

impl CaptureLog {
    /// Create the log directory if needed; the first file opens on first write
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;
        info!("Capture log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    /// Append one record, rotating first if the current file is full
    ///
    /// # Errors
    ///
    /// Returns error if serialisation or the file write fails
    pub fn write(&mut self, record: &CaptureRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, record)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// File currently being written
    pub fn current_file(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Records written to the current file
    pub fn records_in_file(&self) -> usize {
        self.records_in_file
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:06}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened capture file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;
        self.files_opened += 1;

        self.prune()
    }

    /// Delete the oldest capture files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = capture_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for old in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&old) {
                warn!("Failed to remove old capture file {}: {}", old.display(), e);
            }
        }
        Ok(())
    }
}

/// Capture files in a directory, in no particular order
pub fn capture_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_capture = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION));
        if is_capture && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitbang::analyzer::{CycleModel, LogicAnalyzer};
    use crate::bitbang::Transmitter;
    use crate::dshot::encoder::PulseTimeline;
    use crate::dshot::protocol::{BitRate, EscCommand};
    use crate::throttle::FlightState;
    use tempfile::tempdir;

    fn config(dir: &Path, per_file: usize, keep: usize) -> CaptureConfig {
        CaptureConfig {
            enabled: true,
            log_dir: dir.to_string_lossy().into_owned(),
            max_records_per_file: per_file,
            max_files_to_keep: keep,
        }
    }

    fn capture_of(values: [u16; 4]) -> Capture {
        let mut timeline = PulseTimeline::new();
        for (channel, value) in Channel::ALL.into_iter().zip(values) {
            timeline.encode(channel, value, false);
        }
        let mut tx = Transmitter::new(LogicAnalyzer::new(CycleModel::GD32F130));
        tx.transmit(&mut timeline);
        tx.port_mut().take_capture()
    }

    fn report(cycle: u64, values: [u16; 4]) -> CycleReport {
        CycleReport {
            cycle,
            elapsed_us: cycle * 1000,
            state: FlightState::default(),
            values,
            beep: None,
        }
    }

    fn record(cycle: u64) -> CaptureRecord {
        let values = [88, 500, 1047, 1500];
        CaptureRecord::new(&report(cycle, values), &capture_of(values))
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_record_from_capture() {
        let rec = record(7);
        assert_eq!(rec.cycle, 7);
        assert_eq!(rec.channels.len(), 4);
        assert_eq!(rec.channels[0].channel, "ESC1");
        assert_eq!(rec.channels[2].frames, vec![FrameRecord::from(Frame::new(1047, false))]);
        assert!(rec.all_valid());
        let expected = BitRate::COMPILED.slot_period_ns();
        assert!((rec.slot_period_ns.unwrap() - expected).abs() < 1.0);
        assert!(chrono::DateTime::parse_from_rfc3339(&rec.timestamp).is_ok());
    }

    #[test]
    fn test_record_beep_name() {
        let mut rep = report(1, [0; 4]);
        rep.beep = Some(EscCommand::Beep3);
        let rec = CaptureRecord::new(&rep, &Capture::default());
        assert_eq!(rec.beep.as_deref(), Some("Beep3"));
        assert_eq!(rec.slot_period_ns, None);
        assert!(rec.channels.iter().all(|c| c.frames.is_empty()));
    }

    #[test]
    fn test_write_jsonl() {
        let dir = tempdir().unwrap();
        let mut log = CaptureLog::open(&config(dir.path(), 100, 10)).unwrap();
        assert!(log.current_file().is_none());

        log.write(&record(1)).unwrap();
        log.write(&record(2)).unwrap();
        log.flush().unwrap();

        let path = log.current_file().unwrap().to_path_buf();
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["cycle"], 2);
        assert_eq!(lines[0]["channels"][1]["frames"][0]["value"], 500);
        assert_eq!(lines[0]["beep"], serde_json::Value::Null);
    }

    #[test]
    fn test_rotation_by_record_count() {
        let dir = tempdir().unwrap();
        let mut log = CaptureLog::open(&config(dir.path(), 2, 10)).unwrap();
        for cycle in 1..=5 {
            log.write(&record(cycle)).unwrap();
        }
        log.flush().unwrap();

        assert_eq!(capture_files(dir.path()).unwrap().len(), 3);
        assert_eq!(log.records_in_file(), 1);
        assert_eq!(read_lines(log.current_file().unwrap())[0]["cycle"], 5);
    }

    #[test]
    fn test_retention_keeps_newest() {
        let dir = tempdir().unwrap();
        let mut log = CaptureLog::open(&config(dir.path(), 1, 2)).unwrap();
        for cycle in 1..=5 {
            log.write(&record(cycle)).unwrap();
        }
        log.flush().unwrap();

        let mut files = capture_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert_eq!(read_lines(&files[0])[0]["cycle"], 4);
        assert_eq!(read_lines(&files[1])[0]["cycle"], 5);
    }

    #[test]
    fn test_foreign_files_untouched() {
        let dir = tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "bench notes").unwrap();

        let mut log = CaptureLog::open(&config(dir.path(), 1, 1)).unwrap();
        for cycle in 1..=3 {
            log.write(&record(cycle)).unwrap();
        }
        assert!(notes.exists());
        assert_eq!(capture_files(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/captures");
        CaptureLog::open(&config(&nested, 10, 10)).unwrap();
        assert!(nested.is_dir());
    }
}
