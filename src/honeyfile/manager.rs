//! Honeyfile manager: plant and register random-content decoy files.
//!
//! Decoys are named `{prefix}_NNNNN.dat` and filled with bytes from the
//! OS-seeded CSPRNG, so their content is not attacker-predictable. No
//! legitimate process has a reason to touch them; any later change to one is
//! classified at elevated severity by the diff engine.
//!
//! Planting is idempotent in the provision style: an existing decoy is
//! re-digested and re-registered rather than rewritten, so a restarted
//! monitor reuses the planted set and stays coherent with a loaded baseline.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rand::RngCore;

use crate::core::config::HoneyfileConfig;
use crate::core::errors::{FisError, Result};
use crate::scan::hasher;
use crate::scan::snapshot::FileRecord;

/// The distinguished set of decoy paths with their creation-time records.
///
/// Fixed for the monitoring session: planted once at startup, never
/// regenerated mid-run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoneyfileSet {
    records: BTreeMap<PathBuf, FileRecord>,
}

impl HoneyfileSet {
    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.records.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = (&PathBuf, &FileRecord)> {
        self.records.iter()
    }
}

/// Creates and registers honeyfile decoys in a target directory.
pub struct HoneyfileManager {
    directory: PathBuf,
    config: HoneyfileConfig,
}

impl HoneyfileManager {
    pub fn new(directory: PathBuf, config: HoneyfileConfig) -> Self {
        Self { directory, config }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Plant `count` decoys and return the registered set.
    ///
    /// An unwritable directory is fatal to startup: honeyfiles are a core
    /// detection mechanism, not best-effort. Digests are computed immediately
    /// after creation and become each decoy's baseline entry.
    pub fn plant(&self) -> Result<HoneyfileSet> {
        fs::create_dir_all(&self.directory).map_err(|e| FisError::HoneyfileSetup {
            path: self.directory.clone(),
            details: format!("create directory: {e}"),
        })?;

        let mut records = BTreeMap::new();

        for i in 1..=self.config.count {
            let index = u32::try_from(i).unwrap_or(u32::MAX);
            let path = self.file_path(index);

            if !path.exists() {
                self.write_decoy(&path)?;
            }

            let digest = hasher::hash_file(&path).map_err(|e| FisError::HoneyfileSetup {
                path: path.clone(),
                details: format!("digest after creation: {e}"),
            })?;
            let size = fs::metadata(&path)
                .map(|m| m.len())
                .map_err(|e| FisError::HoneyfileSetup {
                    path: path.clone(),
                    details: format!("stat after creation: {e}"),
                })?;

            records.insert(path, FileRecord { digest, size });
        }

        Ok(HoneyfileSet { records })
    }

    fn file_path(&self, index: u32) -> PathBuf {
        self.directory
            .join(format!("{}_{index:05}.dat", self.config.name_prefix))
    }

    fn write_decoy(&self, path: &Path) -> Result<()> {
        let result = self.write_decoy_inner(path);
        if result.is_err() {
            // Clean up a partial file so a retry starts fresh.
            let _ = fs::remove_file(path);
        }
        result
    }

    fn write_decoy_inner(&self, path: &Path) -> Result<()> {
        let mut file = {
            let mut opts = OpenOptions::new();
            opts.write(true).create_new(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt as _;
                opts.mode(0o600);
            }
            opts.open(path).map_err(|e| FisError::HoneyfileSetup {
                path: path.to_path_buf(),
                details: format!("create decoy: {e}"),
            })?
        };

        let mut rng = rand::rng();
        let mut content = vec![0u8; usize::try_from(self.config.size_bytes).unwrap_or(usize::MAX)];
        rng.fill_bytes(&mut content);

        file.write_all(&content)
            .and_then(|()| file.sync_all())
            .map_err(|e| FisError::HoneyfileSetup {
                path: path.to_path_buf(),
                details: format!("write decoy: {e}"),
            })
    }
}
