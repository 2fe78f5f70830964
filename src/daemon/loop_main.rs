//! Main monitoring loop: baseline acquisition, periodic rescans, classified
//! reporting.
//!
//! Architecture: one logical thread of control per monitored root. Scans are
//! strictly sequential — a full walk-hash-diff cycle completes before the
//! next begins — so the baseline is never concurrently mutated and no locking
//! is needed. The walker parallelizes directory enumeration internally; the
//! report sink runs on its own thread behind a bounded channel.
//!
//! The loop cycles Idle → Scanning → Reporting → Idle forever. Termination is
//! external: a signal (or `stop()`) sets the shutdown flag, which also serves
//! as the cancellation token checked per file during walks. The wait between
//! cycles is a sliced blocking sleep, interruptible by shutdown and by a
//! SIGUSR1 scan request.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::{Duration, Instant};

use crate::baseline::store::{BaselineStore, LoadOutcome};
use crate::core::config::Config;
use crate::core::errors::{FisError, Result};
use crate::daemon::signals::SignalHandler;
use crate::diff::engine::DiffEngine;
use crate::honeyfile::manager::{HoneyfileManager, HoneyfileSet};
use crate::report::jsonl::JsonlConfig;
use crate::report::sink::{ReportSinkConfig, ReportSinkHandle, ScanEvent, spawn_sink};
use crate::scan::snapshot::{ScanStats, Snapshot, SnapshotBuilder};
use crate::scan::walker::WalkerConfig;

/// Granularity of the interruptible sleep between cycles.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Loop phase, advanced once per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scanning,
    Reporting,
}

/// The integrity monitor: owns the baseline, the honeyfile registry, and the
/// scan cycle for a single monitored root.
#[derive(Debug)]
pub struct IntegritySentry {
    config: Config,
    store: BaselineStore,
    sink: ReportSinkHandle,
    sink_join: Option<thread::JoinHandle<()>>,
    signals: SignalHandler,
    cancel: Arc<AtomicBool>,
    engine: DiffEngine,
    baseline: Snapshot,
    honeyfiles: HoneyfileSet,
    state: LoopState,
    start_time: Instant,
}

impl IntegritySentry {
    /// Build and wire up the monitor from configuration.
    ///
    /// Baseline and honeyfiles are acquired by `run()` (or `bootstrap()`),
    /// exactly once, before the first scan.
    pub fn init(config: Config) -> Result<Self> {
        let root = canonical_root(&config)?;
        let mut config = config;
        config.monitor.root_path = root;

        let (sink, sink_join) = spawn_sink(ReportSinkConfig {
            jsonl: JsonlConfig {
                path: config.paths.jsonl_log.clone(),
                ..JsonlConfig::default()
            },
            ..ReportSinkConfig::default()
        })?;

        let signals = SignalHandler::new();
        let cancel = signals.shutdown_token();
        let store = BaselineStore::new(config.paths.baseline_file.clone());
        let engine = DiffEngine::new(config.monitor.size_delta_threshold_bytes);
        let root = config.monitor.root_path.clone();

        Ok(Self {
            config,
            store,
            sink,
            sink_join: Some(sink_join),
            signals,
            cancel,
            engine,
            baseline: Snapshot::empty(root),
            honeyfiles: HoneyfileSet::default(),
            state: LoopState::Idle,
            start_time: Instant::now(),
        })
    }

    /// Current loop phase.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// The effective (canonicalized) configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Request shutdown from another thread; the in-progress walk is
    /// cancelled at the next per-file check.
    pub fn stop(&self) {
        self.signals.request_shutdown();
    }

    /// A handle that can stop the sentry after `run()` takes ownership of it.
    pub fn stop_handle(&self) -> SignalHandler {
        self.signals.clone()
    }

    /// Acquire the baseline and plant honeyfiles, exactly once, before the
    /// first scan.
    ///
    /// Honeyfiles are planted first so a freshly built baseline includes
    /// them; after a restart the loaded baseline already carries them and
    /// planting is an idempotent re-registration. Only honeyfile setup
    /// failure is fatal — baseline corruption recovers into a rebuild.
    pub fn bootstrap(&mut self) -> Result<()> {
        let manager = HoneyfileManager::new(
            self.config.honeyfile_directory(),
            self.config.honeyfile.clone(),
        );
        self.honeyfiles = manager.plant()?;
        self.sink.send(ScanEvent::HoneyfilesPlanted {
            count: self.honeyfiles.len(),
            directory: manager.directory().display().to_string(),
        });

        let location = self.store.path().display().to_string();
        match self.store.load() {
            LoadOutcome::Loaded(snapshot) => {
                self.sink.send(ScanEvent::BaselineLoaded {
                    files: snapshot.len(),
                    location,
                });
                self.baseline = snapshot;
            }
            LoadOutcome::Missing => {
                self.rebuild_baseline()?;
                self.sink.send(ScanEvent::BaselineCreated {
                    files: self.baseline.len(),
                    location,
                });
            }
            LoadOutcome::Corrupt { details } => {
                self.sink.send(ScanEvent::BaselineCorrupt {
                    location: location.clone(),
                    details,
                });
                self.rebuild_baseline()?;
                self.sink.send(ScanEvent::BaselineCreated {
                    files: self.baseline.len(),
                    location,
                });
            }
        }

        Ok(())
    }

    /// Run the monitoring loop until shutdown is requested.
    ///
    /// There is no terminal state in normal operation; an in-flight scan is
    /// not guaranteed to complete on termination.
    pub fn run(&mut self) -> Result<()> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.sink.send(ScanEvent::MonitorStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
            root: self.config.monitor.root_path.display().to_string(),
        });

        if let Err(err) = self.bootstrap() {
            // A shutdown signal during the initial walk is a clean exit, not
            // a startup failure.
            if matches!(err, FisError::Interrupted { .. }) {
                self.finish("shutdown requested");
                return Ok(());
            }
            self.sink.send(ScanEvent::Error {
                code: err.code().to_string(),
                message: format!("startup failed: {err}"),
            });
            self.finish("startup failure");
            return Err(err);
        }

        loop {
            if self.signals.should_shutdown() {
                break;
            }

            if self.signals.should_rebaseline() {
                match self.rebuild_baseline() {
                    Ok(()) => self.sink.send(ScanEvent::Rebaselined {
                        files: self.baseline.len(),
                    }),
                    Err(FisError::Interrupted { .. }) => break,
                    Err(err) => self.sink.send(ScanEvent::Error {
                        code: err.code().to_string(),
                        message: format!("re-baseline failed: {err}"),
                    }),
                }
            }

            // ── Scanning ──
            self.state = LoopState::Scanning;
            let scan_start = Instant::now();
            let (current, stats) = match self.build_snapshot() {
                Ok(built) => built,
                Err(FisError::Interrupted { .. }) => break,
                Err(err) => {
                    self.sink.send(ScanEvent::Error {
                        code: err.code().to_string(),
                        message: format!("scan failed: {err}"),
                    });
                    self.state = LoopState::Idle;
                    if !self.sleep_between_cycles() {
                        break;
                    }
                    continue;
                }
            };

            // ── Reporting ──
            self.state = LoopState::Reporting;
            self.report_pass(&current, stats, scan_start.elapsed());

            // ── Idle ──
            self.state = LoopState::Idle;
            if !self.sleep_between_cycles() {
                break;
            }
        }

        self.finish("shutdown requested");
        Ok(())
    }

    /// One-shot scan pass against the in-memory baseline.
    ///
    /// Used by the CLI `check` command; the daemon loop goes through the same
    /// build-and-diff path.
    pub fn scan_once(&mut self) -> Result<Vec<crate::diff::engine::ChangeEvent>> {
        let scan_start = Instant::now();
        let (current, stats) = self.build_snapshot()?;
        let events = self
            .engine
            .diff(&self.baseline, &current, &self.honeyfiles);
        self.emit_events(&events, stats, scan_start.elapsed());
        Ok(events)
    }

    // ──────────────────── internals ────────────────────

    fn build_snapshot(&self) -> Result<(Snapshot, ScanStats)> {
        SnapshotBuilder::new(WalkerConfig::from_monitor(&self.config.monitor))
            .with_cancel(Arc::clone(&self.cancel))
            .build()
    }

    fn rebuild_baseline(&mut self) -> Result<()> {
        let (snapshot, _) = self.build_snapshot()?;
        self.store.save(&snapshot)?;
        self.baseline = snapshot;
        Ok(())
    }

    fn report_pass(&self, current: &Snapshot, stats: ScanStats, elapsed: Duration) {
        let events = self
            .engine
            .diff(&self.baseline, current, &self.honeyfiles);
        self.emit_events(&events, stats, elapsed);
    }

    fn emit_events(
        &self,
        events: &[crate::diff::engine::ChangeEvent],
        stats: ScanStats,
        elapsed: Duration,
    ) {
        let mut changes = 0usize;
        let mut elevated = 0usize;
        for event in events {
            if !event.is_change() {
                continue;
            }
            changes += 1;
            if event.is_elevated() {
                elevated += 1;
            }
            self.sink.send(ScanEvent::Change(event.clone()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = elapsed.as_millis() as u64;
        self.sink.send(ScanEvent::ScanCompleted {
            files_scanned: stats.files_hashed,
            files_skipped: stats.files_skipped,
            changes,
            elevated,
            duration_ms,
        });
    }

    /// Sliced blocking sleep for the configured interval.
    ///
    /// Returns `false` when shutdown was requested during the wait. A pending
    /// SIGUSR1 scan request cuts the wait short and starts the next cycle.
    fn sleep_between_cycles(&self) -> bool {
        let interval = Duration::from_secs(self.config.monitor.scan_interval_secs);
        let deadline = Instant::now() + interval;

        while Instant::now() < deadline {
            if self.signals.should_shutdown() {
                return false;
            }
            if self.signals.should_scan() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(remaining.min(SLEEP_SLICE));
        }
        true
    }

    /// Emit the stop event, then flush and join the report sink.
    ///
    /// Called automatically at the end of `run()`; callers driving
    /// `bootstrap()`/`scan_once()` directly invoke it themselves when done.
    pub fn finish(&mut self, reason: &str) {
        let uptime_secs = self.start_time.elapsed().as_secs();
        self.sink.send(ScanEvent::MonitorStopped {
            reason: reason.to_string(),
            uptime_secs,
        });
        self.sink.shutdown();
        if let Some(join) = self.sink_join.take() {
            let _ = join.join();
        }
    }
}

/// Resolve the monitored root to an absolute, symlink-free path so snapshot
/// keys are stable across runs.
fn canonical_root(config: &Config) -> Result<PathBuf> {
    std::fs::canonicalize(&config.monitor.root_path).map_err(|e| FisError::InvalidConfig {
        details: format!(
            "monitor.root_path {}: {e}",
            config.monitor.root_path.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.monitor.root_path = tmp.path().join("watched");
        config.monitor.scan_interval_secs = 1;
        config.honeyfile.size_bytes = 128;
        config.paths.baseline_file = tmp.path().join("state").join("baseline.json");
        config.paths.jsonl_log = tmp.path().join("state").join("activity.jsonl");
        fs::create_dir_all(tmp.path().join("watched")).unwrap();
        config
    }

    #[test]
    fn init_starts_idle_with_empty_baseline() {
        let tmp = TempDir::new().unwrap();
        let sentry = IntegritySentry::init(test_config(&tmp)).unwrap();
        assert_eq!(sentry.state(), LoopState::Idle);
        assert!(sentry.baseline.is_empty());
    }

    #[test]
    fn init_rejects_missing_root() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.monitor.root_path = tmp.path().join("no_such_dir");
        let err = IntegritySentry::init(config).unwrap_err();
        assert_eq!(err.code(), "FIS-1001");
    }

    #[test]
    fn bootstrap_creates_baseline_with_honeyfiles_included() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::write(config.monitor.root_path.join("data.txt"), b"payload").unwrap();

        let mut sentry = IntegritySentry::init(config).unwrap();
        sentry.bootstrap().unwrap();

        assert_eq!(sentry.honeyfiles.len(), 1);
        // Baseline covers the real file plus the decoy.
        assert_eq!(sentry.baseline.len(), 2);
        for decoy in sentry.honeyfiles.paths() {
            assert!(sentry.baseline.contains(decoy));
        }
        assert!(sentry.store.exists());
    }

    #[test]
    fn bootstrap_reloads_persisted_baseline() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::write(config.monitor.root_path.join("data.txt"), b"payload").unwrap();

        let mut first = IntegritySentry::init(config.clone()).unwrap();
        first.bootstrap().unwrap();
        let saved = first.baseline.clone();
        first.finish("test over");

        let mut second = IntegritySentry::init(config).unwrap();
        second.bootstrap().unwrap();
        assert_eq!(second.baseline, saved);
        second.finish("test over");
    }

    #[test]
    fn bootstrap_recovers_from_corrupt_baseline() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        fs::create_dir_all(config.paths.baseline_file.parent().unwrap()).unwrap();
        fs::write(&config.paths.baseline_file, b"{ not a baseline").unwrap();

        let mut sentry = IntegritySentry::init(config).unwrap();
        sentry.bootstrap().unwrap();

        // Rebuilt from scratch and re-saved.
        assert!(sentry.store.exists());
        assert!(matches!(sentry.store.load(), LoadOutcome::Loaded(_)));
        sentry.finish("test over");
    }

    #[test]
    fn scan_once_detects_mutations() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);
        let root = config.monitor.root_path.clone();
        fs::write(root.join("a.txt"), b"hello").unwrap();

        let mut sentry = IntegritySentry::init(config).unwrap();
        sentry.bootstrap().unwrap();

        fs::write(root.join("a.txt"), b"hello world").unwrap();
        fs::write(root.join("b.txt"), b"brand new").unwrap();

        let events = sentry.scan_once().unwrap();
        let changes: Vec<_> = events.iter().filter(|e| e.is_change()).collect();
        assert_eq!(changes.len(), 2);
        sentry.finish("test over");
    }

    #[test]
    fn honeyfile_tamper_detected_at_elevated_severity() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(&tmp);

        let mut sentry = IntegritySentry::init(config).unwrap();
        sentry.bootstrap().unwrap();

        let decoy = sentry.honeyfiles.paths().next().unwrap().clone();
        fs::write(&decoy, b"ransomware was here").unwrap();

        let events = sentry.scan_once().unwrap();
        let tampered: Vec<_> = events.iter().filter(|e| e.path == decoy).collect();
        assert_eq!(tampered.len(), 1);
        assert!(tampered[0].is_elevated());
        sentry.finish("test over");
    }

    #[test]
    fn stop_requested_before_run_exits_promptly() {
        let tmp = TempDir::new().unwrap();
        let mut sentry = IntegritySentry::init(test_config(&tmp)).unwrap();

        sentry.stop();
        // Bootstrap succeeds; the loop observes shutdown before the first scan.
        sentry.run().unwrap();
        assert_eq!(sentry.state(), LoopState::Idle);
    }

    #[test]
    fn stop_handle_interrupts_running_loop() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.monitor.scan_interval_secs = 30;
        fs::write(config.monitor.root_path.join("a.txt"), b"x").unwrap();

        let mut sentry = IntegritySentry::init(config).unwrap();
        let handle = sentry.stop_handle();

        let join = thread::spawn(move || sentry.run());
        thread::sleep(Duration::from_millis(300));
        handle.request_shutdown();

        let result = join.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn sigusr1_request_shortens_the_wait() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.monitor.scan_interval_secs = 60;

        let sentry = IntegritySentry::init(config).unwrap();
        sentry.signals.request_scan();

        let start = Instant::now();
        assert!(sentry.sleep_between_cycles());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
