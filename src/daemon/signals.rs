//! Signal handling: SIGTERM/SIGINT graceful shutdown, SIGUSR1 immediate scan,
//! SIGHUP re-baseline request.
//!
//! Uses the `signal-hook` crate for safe signal registration. The monitoring
//! loop polls `SignalHandler` flags each iteration rather than blocking on
//! signals. The shutdown flag doubles as the walk-cancellation token: the
//! same `Arc<AtomicBool>` that the signal sets is checked per file during a
//! long walk, so a termination request interrupts an in-progress scan
//! promptly instead of waiting for the cycle boundary.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Thread-safe signal state shared between the signal handler and the loop.
///
/// All flags use `Ordering::Relaxed` because the loop polls them every
/// iteration and exact ordering with other atomics is not required.
#[derive(Clone, Debug)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    scan_flag: Arc<AtomicBool>,
    rebaseline_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// On Unix: SIGTERM/SIGINT -> shutdown, SIGUSR1 -> immediate scan,
    /// SIGHUP -> re-baseline. Registration is best-effort; failures are
    /// logged to stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::detached();
        handler.register_signals();
        handler
    }

    /// Create a handler with no OS hooks (programmatic control only).
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            scan_flag: Arc::new(AtomicBool::new(false)),
            rebaseline_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether a shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check (and clear) whether an immediate scan has been requested.
    pub fn should_scan(&self) -> bool {
        self.scan_flag.swap(false, Ordering::Relaxed)
    }

    /// Check (and clear) whether a re-baseline has been requested.
    pub fn should_rebaseline(&self) -> bool {
        self.rebaseline_flag.swap(false, Ordering::Relaxed)
    }

    /// Programmatically request shutdown (explicit `stop()` lifecycle).
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Programmatically request an immediate scan.
    pub fn request_scan(&self) {
        self.scan_flag.store(true, Ordering::Relaxed);
    }

    /// Programmatically request a re-baseline.
    pub fn request_rebaseline(&self) {
        self.rebaseline_flag.store(true, Ordering::Relaxed);
    }

    /// The shutdown flag itself, for use as a walk-cancellation token.
    pub fn shutdown_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[FIS-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[FIS-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1};
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.scan_flag)) {
                eprintln!("[FIS-SIGNAL] failed to register SIGUSR1: {e}");
            }
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.rebaseline_flag)) {
                eprintln!("[FIS-SIGNAL] failed to register SIGHUP: {e}");
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
