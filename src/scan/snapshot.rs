//! Directory snapshots: a complete mapping of file paths to content records.
//!
//! A snapshot covers exactly the regular files present under the monitored
//! root at the time of the walk. Directories and symlinks are not recorded
//! independently. Keys are unique by construction (`BTreeMap`) and every
//! record belongs to the walk that produced it — a rebuild starts from an
//! empty map, never by mutating a previous snapshot in place.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::errors::{FisError, Result};
use crate::scan::hasher::{self, FileDigest};
use crate::scan::walker::{DirectoryWalker, WalkerConfig};

/// Immutable per-file record: content digest plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub digest: FileDigest,
    pub size: u64,
}

/// A complete point-in-time mapping of the monitored tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root the walk started from.
    pub root: PathBuf,
    /// RFC 3339 UTC timestamp of the walk.
    pub created_at: String,
    /// Path → record. Sorted map keeps the persisted form deterministic.
    pub files: BTreeMap<PathBuf, FileRecord>,
}

impl Snapshot {
    /// An empty snapshot for a root (fresh start, corrupt-baseline recovery).
    #[must_use]
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            created_at: utc_now_rfc3339(),
            files: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn insert(&mut self, path: PathBuf, record: FileRecord) {
        self.files.insert(path, record);
    }

    /// Iterate paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }
}

/// Counters reported alongside a completed build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files successfully hashed into the snapshot.
    pub files_hashed: usize,
    /// Files listed by the walker but gone or unreadable at hash time.
    /// They are simply absent from the snapshot; the diff pass reports the
    /// absence relative to baseline rather than an internal failure.
    pub files_skipped: usize,
}

/// Walks the monitored tree and hashes every regular file into a `Snapshot`.
pub struct SnapshotBuilder {
    walker_config: WalkerConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl SnapshotBuilder {
    pub fn new(walker_config: WalkerConfig) -> Self {
        Self {
            walker_config,
            cancel: None,
        }
    }

    /// Attach a cooperative stop flag, checked once per file while hashing
    /// and between directories inside the walker.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Build a complete snapshot of the configured root.
    ///
    /// Memory stays O(file count): entries stream from the walker and file
    /// content is hashed in bounded chunks. Per-file IO errors are swallowed
    /// into `ScanStats::files_skipped`; only cancellation aborts the build.
    pub fn build(&self) -> Result<(Snapshot, ScanStats)> {
        let mut walker = DirectoryWalker::new(self.walker_config.clone());
        if let Some(cancel) = &self.cancel {
            walker = walker.with_cancel(Arc::clone(cancel));
        }

        let mut snapshot = Snapshot::empty(self.walker_config.root_path.clone());
        let mut stats = ScanStats::default();

        for entry in walker.stream() {
            if self.is_cancelled() {
                return Err(FisError::Interrupted {
                    context: "snapshot build",
                });
            }

            match hasher::hash_file(&entry.path) {
                Ok(digest) => {
                    snapshot.insert(
                        entry.path,
                        FileRecord {
                            digest,
                            size: entry.size,
                        },
                    );
                    stats.files_hashed += 1;
                }
                // Vanished or unreadable between listing and hashing.
                Err(FisError::Io { .. }) => stats.files_skipped += 1,
                Err(other) => return Err(other),
            }
        }

        if self.is_cancelled() {
            return Err(FisError::Interrupted {
                context: "snapshot build",
            });
        }

        Ok((snapshot, stats))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Current UTC time as RFC 3339 with millisecond precision.
#[must_use]
pub fn utc_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn builder_for(root: &Path) -> SnapshotBuilder {
        SnapshotBuilder::new(WalkerConfig {
            root_path: root.to_path_buf(),
            max_depth: 16,
            follow_symlinks: false,
            parallelism: 2,
            excluded_paths: HashSet::new(),
        })
    }

    #[test]
    fn build_records_every_file_with_digest_and_size() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        fs::write(tmp.path().join("sub").join("b.txt"), b"world!!").unwrap();

        let (snapshot, stats) = builder_for(tmp.path()).build().unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(stats.files_hashed, 2);
        assert_eq!(stats.files_skipped, 0);

        let a = snapshot.get(&tmp.path().join("a.txt")).unwrap();
        assert_eq!(a.size, 5);
        assert_eq!(a.digest, hasher::hash_bytes(b"hello"));

        let b = snapshot.get(&tmp.path().join("sub").join("b.txt")).unwrap();
        assert_eq!(b.size, 7);
    }

    #[test]
    fn rebuild_produces_identical_snapshot_for_unchanged_tree() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("stable.txt"), b"unchanging").unwrap();

        let (first, _) = builder_for(tmp.path()).build().unwrap();
        let (second, _) = builder_for(tmp.path()).build().unwrap();

        assert_eq!(first.files, second.files);
    }

    #[test]
    fn empty_tree_yields_empty_snapshot() {
        let tmp = TempDir::new().unwrap();
        let (snapshot, stats) = builder_for(tmp.path()).build().unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(stats.files_hashed, 0);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("ok.txt"), b"fine").unwrap();
        let locked = tmp.path().join("locked.txt");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let (snapshot, stats) = builder_for(tmp.path()).build().unwrap();

        // Restore so TempDir cleanup succeeds.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        if running_as_root() {
            // Root ignores permission bits; both files hash.
            assert_eq!(stats.files_hashed, 2);
        } else {
            assert!(snapshot.contains(&tmp.path().join("ok.txt")));
            assert!(!snapshot.contains(&locked));
            assert_eq!(stats.files_hashed, 1);
            assert_eq!(stats.files_skipped, 1);
        }
    }

    #[cfg(unix)]
    fn running_as_root() -> bool {
        std::fs::read_to_string("/proc/self/status")
            .map(|s| s.lines().any(|l| l.starts_with("Uid:\t0\t")))
            .unwrap_or(false)
    }

    #[test]
    fn cancelled_build_returns_interrupted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"x").unwrap();

        let cancel = Arc::new(AtomicBool::new(true));
        let builder = builder_for(tmp.path()).with_cancel(cancel);
        let err = builder.build().unwrap_err();
        assert_eq!(err.code(), "FIS-3003");
    }

    #[test]
    fn snapshot_serde_roundtrip_preserves_records() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("r.txt"), b"roundtrip me").unwrap();
        let (snapshot, _) = builder_for(tmp.path()).build().unwrap();

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn scales_to_thousands_of_files() {
        let tmp = TempDir::new().unwrap();
        for d in 0..20 {
            let dir = tmp.path().join(format!("d{d}"));
            fs::create_dir_all(&dir).unwrap();
            for f in 0..100 {
                fs::write(dir.join(format!("f{f}")), format!("{d}-{f}")).unwrap();
            }
        }

        let (snapshot, stats) = builder_for(tmp.path()).build().unwrap();
        assert_eq!(snapshot.len(), 2000);
        assert_eq!(stats.files_hashed, 2000);
    }
}
