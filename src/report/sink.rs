//! Report sink: a dedicated thread owns the JSONL writer; all other threads
//! send `ScanEvent`s via a bounded crossbeam channel. Non-blocking `try_send()`
//! ensures the monitoring loop is never blocked by logging back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::Result;
use crate::diff::engine::{ChangeEvent, ChangeKind};
use crate::report::jsonl::{JsonlConfig, JsonlWriter, LogEntry, LogEventType, LogSeverity};

/// Default bounded channel capacity for report events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events emitted through the report sink.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    MonitorStarted {
        version: String,
        config_hash: String,
        root: String,
    },
    MonitorStopped {
        reason: String,
        uptime_secs: u64,
    },
    BaselineCreated {
        files: usize,
        location: String,
    },
    BaselineLoaded {
        files: usize,
        location: String,
    },
    /// Corruption recovered into a fresh baseline; observable, never fatal.
    BaselineCorrupt {
        location: String,
        details: String,
    },
    Rebaselined {
        files: usize,
    },
    HoneyfilesPlanted {
        count: usize,
        directory: String,
    },
    /// One classified change from a diff pass (Unchanged is not reported).
    Change(ChangeEvent),
    ScanCompleted {
        files_scanned: usize,
        files_skipped: usize,
        changes: usize,
        elevated: usize,
        duration_ms: u64,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the sink thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for sending report events.
///
/// Internally wraps a bounded crossbeam `Sender`. The `send()` method uses
/// `try_send()` so callers are never blocked by logging back-pressure.
#[derive(Clone, Debug)]
pub struct ReportSinkHandle {
    tx: Sender<ScanEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ReportSinkHandle {
    /// Send an event to the sink thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ScanEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown of the sink thread.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ScanEvent::Shutdown);
    }
}

/// Options for building the report sink.
pub struct ReportSinkConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl Default for ReportSinkConfig {
    fn default() -> Self {
        Self {
            jsonl: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the sink thread and return a handle.
///
/// The returned handle is `Clone + Send` and can be shared across threads.
/// The sink thread runs until `handle.shutdown()` is called or all senders
/// are dropped.
pub fn spawn_sink(config: ReportSinkConfig) -> Result<(ReportSinkHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ScanEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ReportSinkHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("fis-report".to_string())
        .spawn(move || {
            sink_thread_main(&rx, config.jsonl, &dropped_clone);
        })
        .map_err(|e| crate::core::errors::FisError::Runtime {
            details: format!("failed to spawn report sink thread: {e}"),
        })?;

    Ok((handle, join))
}

fn sink_thread_main(rx: &Receiver<ScanEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        // Report dropped events periodically.
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(LogEventType::Error, LogSeverity::Warning);
            warn.details = Some(format!("{d} report events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ScanEvent::Shutdown) {
            jsonl.flush();
            jsonl.fsync();
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }
}

/// Map a scan event to its JSONL representation.
fn event_to_log_entry(event: &ScanEvent) -> LogEntry {
    match event {
        ScanEvent::MonitorStarted {
            version,
            config_hash,
            root,
        } => {
            let mut entry = LogEntry::new(LogEventType::MonitorStart, LogSeverity::Info);
            entry.path = Some(root.clone());
            entry.details = Some(format!("version={version} config_hash={config_hash}"));
            entry
        }
        ScanEvent::MonitorStopped {
            reason,
            uptime_secs,
        } => {
            let mut entry = LogEntry::new(LogEventType::MonitorStop, LogSeverity::Info);
            entry.details = Some(format!("{reason} (uptime={uptime_secs}s)"));
            entry
        }
        ScanEvent::BaselineCreated { files, location } => {
            let mut entry = LogEntry::new(LogEventType::BaselineCreated, LogSeverity::Info);
            entry.path = Some(location.clone());
            entry.files_scanned = Some(*files);
            entry
        }
        ScanEvent::BaselineLoaded { files, location } => {
            let mut entry = LogEntry::new(LogEventType::BaselineLoaded, LogSeverity::Info);
            entry.path = Some(location.clone());
            entry.files_scanned = Some(*files);
            entry
        }
        ScanEvent::BaselineCorrupt { location, details } => {
            let mut entry = LogEntry::new(LogEventType::BaselineCorrupt, LogSeverity::Warning);
            entry.path = Some(location.clone());
            entry.details = Some(details.clone());
            entry
        }
        ScanEvent::Rebaselined { files } => {
            let mut entry = LogEntry::new(LogEventType::Rebaselined, LogSeverity::Info);
            entry.files_scanned = Some(*files);
            entry
        }
        ScanEvent::HoneyfilesPlanted { count, directory } => {
            let mut entry = LogEntry::new(LogEventType::HoneyfilesPlanted, LogSeverity::Info);
            entry.path = Some(directory.clone());
            entry.changes = Some(*count);
            entry
        }
        ScanEvent::Change(change) => change_to_log_entry(change),
        ScanEvent::ScanCompleted {
            files_scanned,
            files_skipped,
            changes,
            elevated,
            duration_ms,
        } => {
            let mut entry = LogEntry::new(LogEventType::ScanComplete, LogSeverity::Info);
            entry.files_scanned = Some(*files_scanned);
            entry.files_skipped = Some(*files_skipped);
            entry.changes = Some(*changes);
            entry.elevated = Some(*elevated);
            entry.duration_ms = Some(*duration_ms);
            entry
        }
        ScanEvent::Error { code, message } => {
            let mut entry = LogEntry::new(LogEventType::Error, LogSeverity::Warning);
            entry.error_code = Some(code.clone());
            entry.error_message = Some(message.clone());
            entry
        }
        ScanEvent::Shutdown => LogEntry::new(LogEventType::MonitorStop, LogSeverity::Info),
    }
}

fn change_to_log_entry(change: &ChangeEvent) -> LogEntry {
    let severity = if change.is_elevated() {
        LogSeverity::Critical
    } else {
        LogSeverity::Info
    };

    let mut entry = match &change.kind {
        ChangeKind::Added => LogEntry::new(LogEventType::FileAdded, severity),
        ChangeKind::Deleted => LogEntry::new(LogEventType::FileDeleted, severity),
        ChangeKind::Modified {
            is_honeyfile,
            size_delta,
        } => {
            let mut entry = LogEntry::new(LogEventType::FileModified, severity);
            entry.is_honeyfile = Some(*is_honeyfile);
            entry.size_delta = Some(*size_delta);
            entry
        }
        // Unchanged events are filtered before the sink; keep a sane mapping anyway.
        ChangeKind::Unchanged => LogEntry::new(LogEventType::ScanComplete, LogSeverity::Info),
    };
    entry.path = Some(change.path.display().to_string());
    entry
}
