//! Baseline store: atomic persistence and corruption-tolerant loading.
//!
//! The store exclusively owns the on-disk snapshot representation. Saves go
//! through write-temp-then-rename so a crash mid-write can never leave a
//! half-written file in place of the baseline. Loads distinguish "no baseline
//! yet" from "baseline unreadable" so callers can log the corruption they
//! recovered from instead of silently starting fresh.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write as IoWrite};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::errors::{FisError, Result};
use crate::scan::hasher::FileDigest;
use crate::scan::snapshot::{Snapshot, utc_now_rfc3339};

/// Format version for forward compatibility.
const BASELINE_VERSION: u32 = 1;

/// Serialized envelope around the snapshot payload.
#[derive(Debug, Serialize, Deserialize)]
struct BaselineEnvelope {
    version: u32,
    saved_at: String,
    /// SHA-256 of the serialized snapshot, hex-encoded.
    integrity: FileDigest,
    snapshot: Snapshot,
}

/// Outcome of loading the persisted baseline.
///
/// `Missing` and `Corrupt` are both recoverable: the caller rebuilds a fresh
/// baseline. `Corrupt` carries the parse/integrity details so the recovery is
/// observable rather than indistinguishable from a first run.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Snapshot),
    Missing,
    Corrupt { details: String },
}

/// Owns the baseline file at a fixed location. One store per monitored root;
/// no concurrent writers are assumed.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a baseline file currently exists at the store location.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Persist a snapshot atomically (write temp file, fsync, rename).
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_vec(snapshot).map_err(|e| FisError::Serialization {
            context: "baseline_save",
            details: e.to_string(),
        })?;
        let integrity = integrity_of(&payload);

        let envelope = BaselineEnvelope {
            version: BASELINE_VERSION,
            saved_at: utc_now_rfc3339(),
            integrity,
            snapshot: snapshot.clone(),
        };

        let temp_path = self.path.with_extension("tmp");
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).map_err(|e| FisError::io(parent, e))?;
        }

        let file = {
            let mut opts = OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o600);
            }
            opts.open(&temp_path)
                .map_err(|e| FisError::io(&temp_path, e))?
        };

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &envelope).map_err(|e| FisError::Serialization {
            context: "baseline_write",
            details: e.to_string(),
        })?;
        writer.flush().map_err(|e| FisError::io(&temp_path, e))?;
        writer
            .into_inner()
            .map_err(|e| FisError::io(&temp_path, e.into_error()))?
            .sync_all()
            .map_err(|e| FisError::io(&temp_path, e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| FisError::io(&self.path, e))?;
        Ok(())
    }

    /// Load the persisted baseline.
    ///
    /// Never fails: a missing file yields `Missing`; unreadable, unparseable,
    /// version-mismatched, or integrity-failed data yields `Corrupt` with the
    /// reason. Either way the caller rebuilds rather than crashing.
    pub fn load(&self) -> LoadOutcome {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(err) if err.kind() == ErrorKind::NotFound => return LoadOutcome::Missing,
            Err(err) => {
                return LoadOutcome::Corrupt {
                    details: format!("open failed: {err}"),
                };
            }
        };

        let reader = BufReader::new(file);
        let envelope: BaselineEnvelope = match serde_json::from_reader(reader) {
            Ok(env) => env,
            Err(err) => {
                return LoadOutcome::Corrupt {
                    details: format!("parse failed: {err}"),
                };
            }
        };

        if envelope.version != BASELINE_VERSION {
            return LoadOutcome::Corrupt {
                details: format!(
                    "unsupported baseline version {} (expected {BASELINE_VERSION})",
                    envelope.version
                ),
            };
        }

        // Verify the integrity hash over the re-serialized payload.
        let payload = match serde_json::to_vec(&envelope.snapshot) {
            Ok(bytes) => bytes,
            Err(err) => {
                return LoadOutcome::Corrupt {
                    details: format!("re-serialization failed: {err}"),
                };
            }
        };
        if integrity_of(&payload) != envelope.integrity {
            return LoadOutcome::Corrupt {
                details: "integrity hash mismatch".to_string(),
            };
        }

        LoadOutcome::Loaded(envelope.snapshot)
    }
}

fn integrity_of(payload: &[u8]) -> FileDigest {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    FileDigest::from_bytes(hasher.finalize().into())
}
