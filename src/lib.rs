#![forbid(unsafe_code)]

//! File Integrity Sentry (fis) — poll-based file integrity monitor.
//!
//! Three-part detection model:
//! 1. **Baseline** — a cryptographic snapshot of the monitored tree,
//!    persisted so monitoring resumes across restarts without re-trusting
//!    the current state
//! 2. **Periodic diff** — every file re-hashed each cycle and classified as
//!    added, deleted, modified, or unchanged
//! 3. **Honeyfiles** — planted decoys with random content; any change to one
//!    is flagged at elevated severity
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use file_integrity_sentry::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use file_integrity_sentry::core::config::Config;
//! use file_integrity_sentry::diff::engine::DiffEngine;
//! ```

pub mod prelude;

pub mod baseline;
pub mod core;
pub mod daemon;
pub mod diff;
pub mod honeyfile;
pub mod report;
pub mod scan;
