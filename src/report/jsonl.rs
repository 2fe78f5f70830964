//! JSONL report writer: append-only line-delimited JSON.
//!
//! Each line is a self-contained JSON object. Lines are assembled in memory
//! and written atomically via `write_all` to prevent interleaved partial
//! lines when the file is being tailed by another process.
//!
//! Degradation chain:
//! 1. Primary file path
//! 2. stderr with `[FIS-JSONL]` prefix
//! 3. Silent discard (monitoring must never crash for logging failures)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::scan::snapshot::utc_now_rfc3339;

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Critical,
}

/// Log event types matching the sentry activity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventType {
    MonitorStart,
    MonitorStop,
    BaselineCreated,
    BaselineLoaded,
    BaselineCorrupt,
    Rebaselined,
    HoneyfilesPlanted,
    ScanComplete,
    FileAdded,
    FileDeleted,
    FileModified,
    Error,
}

/// A single JSONL log entry — all fields optional except `ts`, `event`, `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: LogEventType,
    pub severity: LogSeverity,
    /// Affected filesystem path (when applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Signed size change for modifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_delta: Option<i64>,
    /// Whether the affected path is a registered honeyfile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_honeyfile: Option<bool>,
    /// Files hashed during a scan pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_scanned: Option<usize>,
    /// Files listed but gone or unreadable at hash time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_skipped: Option<usize>,
    /// Count of changes detected in a pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<usize>,
    /// Count of elevated-severity changes in a pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: LogEventType, severity: LogSeverity) -> Self {
        Self {
            ts: utc_now_rfc3339(),
            event,
            severity,
            path: None,
            size_delta: None,
            is_honeyfile: None,
            files_scanned: None,
            files_skipped: None,
            changes: None,
            elevated: None,
            duration_ms: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Maximum file size before rotation (bytes).
    pub max_size_bytes: u64,
    /// Number of rotated files to keep.
    pub max_rotated_files: u32,
    /// Seconds between forced fsync calls.
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/fis/activity.jsonl"),
            max_size_bytes: 50 * 1024 * 1024,
            max_rotated_files: 5,
            fsync_interval_secs: 10,
        }
    }
}

/// Append-only JSONL log writer with rotation and stderr fallback.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: SystemTime,
}

impl JsonlWriter {
    /// Open the JSONL log file. Falls through the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
            last_fsync: SystemTime::now(),
        };
        w.try_open_primary();
        w
    }

    /// Write a single log entry as one atomic JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                // Serialization failure is a programming error; note and bail.
                let _ = writeln!(io::stderr(), "[FIS-JSONL] serialize error: {e}");
                return;
            }
        };

        self.write_line(&line);
    }

    /// Flush buffers.
    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Force an fsync on the underlying file.
    pub fn fsync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_all();
        }
        self.last_fsync = SystemTime::now();
    }

    /// Current degradation level, for diagnostics.
    pub fn is_degraded(&self) -> bool {
        self.state != WriterState::Normal
    }

    fn try_open_primary(&mut self) {
        if let Some(parent) = self.config.path.parent()
            && fs::create_dir_all(parent).is_err()
        {
            self.degrade();
            return;
        }

        let opened = {
            let mut opts = OpenOptions::new();
            opts.append(true).create(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o600);
            }
            opts.open(&self.config.path)
        };

        match opened {
            Ok(file) => {
                self.bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
                self.writer = Some(BufWriter::new(file));
                self.state = WriterState::Normal;
            }
            Err(e) => {
                let _ = writeln!(
                    io::stderr(),
                    "[FIS-JSONL] cannot open {}: {e}",
                    self.config.path.display()
                );
                self.degrade();
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        self.state = match self.state {
            WriterState::Normal => WriterState::Stderr,
            WriterState::Stderr | WriterState::Discard => WriterState::Discard,
        };
    }

    fn write_line(&mut self, line: &str) {
        match self.state {
            WriterState::Normal => {
                self.maybe_rotate();
                let failed = self
                    .writer
                    .as_mut()
                    .is_none_or(|w| w.write_all(line.as_bytes()).is_err());
                if failed {
                    self.state = WriterState::Stderr;
                    let _ = write!(io::stderr(), "[FIS-JSONL] {line}");
                    return;
                }
                self.bytes_written += line.len() as u64;
                self.maybe_fsync();
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[FIS-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let due = self
            .last_fsync
            .elapsed()
            .map(|d| d.as_secs() >= self.config.fsync_interval_secs)
            .unwrap_or(true);
        if due {
            self.fsync();
        }
    }

    fn maybe_rotate(&mut self) {
        if self.bytes_written < self.config.max_size_bytes {
            return;
        }

        self.flush();
        self.writer = None;

        // Shift rotated files: log.N-1 → log.N, newest plain file → log.1.
        for i in (1..self.config.max_rotated_files).rev() {
            let from = rotated_path(&self.config.path, i);
            let to = rotated_path(&self.config.path, i + 1);
            if from.exists() {
                let _ = rename(&from, &to);
            }
        }
        let _ = rename(&self.config.path, rotated_path(&self.config.path, 1));

        self.bytes_written = 0;
        self.try_open_primary();
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

fn rotated_path(base: &std::path::Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
