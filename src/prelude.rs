//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use file_integrity_sentry::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{FisError, Result};

// Scanning
pub use crate::scan::hasher::{FileDigest, hash_file};
pub use crate::scan::snapshot::{FileRecord, ScanStats, Snapshot, SnapshotBuilder};
pub use crate::scan::walker::{DirectoryWalker, WalkerConfig};

// Baseline
pub use crate::baseline::store::{BaselineStore, LoadOutcome};

// Honeyfiles
pub use crate::honeyfile::manager::{HoneyfileManager, HoneyfileSet};

// Diff
pub use crate::diff::engine::{ChangeEvent, ChangeKind, DiffEngine, Severity};

// Reporting
pub use crate::report::sink::{ReportSinkHandle, ScanEvent, spawn_sink};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::IntegritySentry;
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::SignalHandler;
