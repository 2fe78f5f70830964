//! Diff engine: full three-way comparison of a fresh scan against the baseline.
//!
//! Every pass enumerates all three categories — deleted, present-in-both, and
//! added — against the complete snapshots. This is a full re-scan comparison,
//! not an incremental diff. The engine borrows the baseline read-only and
//! never writes to disk; baseline updates go through the store's save path.

#![allow(missing_docs)]

use std::path::PathBuf;

use serde::Serialize;

use crate::honeyfile::manager::HoneyfileSet;
use crate::scan::snapshot::Snapshot;

/// Priority attached to an event for the reporting layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Normal,
    /// Suspicious: honeyfile involvement or an anomalous size delta.
    Elevated,
}

/// What happened to a single path between baseline and current scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified {
        is_honeyfile: bool,
        /// `current.size - baseline.size`, signed.
        size_delta: i64,
    },
    Unchanged,
}

impl ChangeKind {
    /// Stable label for log output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified { .. } => "modified",
            Self::Unchanged => "unchanged",
        }
    }
}

/// One classified observation, produced fresh each scan cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub severity: Severity,
}

impl ChangeEvent {
    /// Whether this event represents an actual difference from baseline.
    #[must_use]
    pub const fn is_change(&self) -> bool {
        !matches!(self.kind, ChangeKind::Unchanged)
    }

    #[must_use]
    pub const fn is_elevated(&self) -> bool {
        matches!(self.severity, Severity::Elevated)
    }
}

/// Compares snapshots and classifies changes.
#[derive(Debug)]
pub struct DiffEngine {
    /// Absolute size change (bytes) above which a modification is elevated.
    size_delta_threshold: u64,
}

impl DiffEngine {
    pub fn new(size_delta_threshold: u64) -> Self {
        Self {
            size_delta_threshold,
        }
    }

    /// Classify every path across baseline and current.
    ///
    /// 1. Paths in baseline but not current: `Deleted`.
    /// 2. Paths in both: digest mismatch → `Modified`, else `Unchanged`.
    /// 3. Paths in current but not baseline: `Added`.
    ///
    /// A modification is elevated when the path is a registered honeyfile OR
    /// the absolute size delta exceeds the threshold — independent triggers;
    /// either alone elevates. Deleting a honeyfile is also elevated: decoy
    /// removal is as anomalous as decoy modification.
    pub fn diff(
        &self,
        baseline: &Snapshot,
        current: &Snapshot,
        honeyfiles: &HoneyfileSet,
    ) -> Vec<ChangeEvent> {
        let mut events = Vec::with_capacity(baseline.len() + current.len());

        for path in baseline.paths() {
            if !current.contains(path) {
                let severity = if honeyfiles.contains(path) {
                    Severity::Elevated
                } else {
                    Severity::Normal
                };
                events.push(ChangeEvent {
                    path: path.clone(),
                    kind: ChangeKind::Deleted,
                    severity,
                });
            }
        }

        for (path, current_record) in &current.files {
            let Some(baseline_record) = baseline.get(path) else {
                events.push(ChangeEvent {
                    path: path.clone(),
                    kind: ChangeKind::Added,
                    severity: Severity::Normal,
                });
                continue;
            };

            if current_record.digest == baseline_record.digest {
                events.push(ChangeEvent {
                    path: path.clone(),
                    kind: ChangeKind::Unchanged,
                    severity: Severity::Normal,
                });
                continue;
            }

            let is_honeyfile = honeyfiles.contains(path);
            #[allow(clippy::cast_possible_wrap)]
            let size_delta = current_record.size as i64 - baseline_record.size as i64;
            let severity =
                if is_honeyfile || size_delta.unsigned_abs() > self.size_delta_threshold {
                    Severity::Elevated
                } else {
                    Severity::Normal
                };

            events.push(ChangeEvent {
                path: path.clone(),
                kind: ChangeKind::Modified {
                    is_honeyfile,
                    size_delta,
                },
                severity,
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DEFAULT_SIZE_DELTA_THRESHOLD_BYTES;
    use crate::honeyfile::manager::HoneyfileManager;
    use crate::scan::hasher::hash_bytes;
    use crate::scan::snapshot::FileRecord;
    use std::path::Path;

    fn record(content: &[u8]) -> FileRecord {
        FileRecord {
            digest: hash_bytes(content),
            size: content.len() as u64,
        }
    }

    fn snapshot_with(entries: &[(&str, &[u8])]) -> Snapshot {
        let mut snapshot = Snapshot::empty("/watched");
        for (path, content) in entries {
            snapshot.insert(PathBuf::from(*path), record(content));
        }
        snapshot
    }

    fn engine() -> DiffEngine {
        DiffEngine::new(DEFAULT_SIZE_DELTA_THRESHOLD_BYTES)
    }

    fn find<'a>(events: &'a [ChangeEvent], path: &str) -> Vec<&'a ChangeEvent> {
        events
            .iter()
            .filter(|e| e.path == Path::new(path))
            .collect()
    }

    #[test]
    fn unchanged_content_emits_only_unchanged() {
        let baseline = snapshot_with(&[("/watched/a.txt", b"same"), ("/watched/b.txt", b"also")]);
        let current = baseline.clone();

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ChangeKind::Unchanged));
        assert!(events.iter().all(|e| !e.is_change()));
    }

    #[test]
    fn added_path_emits_exactly_one_added() {
        let baseline = snapshot_with(&[("/watched/old.txt", b"old")]);
        let current = snapshot_with(&[("/watched/old.txt", b"old"), ("/watched/new.txt", b"new")]);

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());

        let for_new = find(&events, "/watched/new.txt");
        assert_eq!(for_new.len(), 1);
        assert_eq!(for_new[0].kind, ChangeKind::Added);
        assert_eq!(for_new[0].severity, Severity::Normal);
    }

    #[test]
    fn deleted_path_emits_exactly_one_deleted() {
        let baseline = snapshot_with(&[("/watched/keep.txt", b"k"), ("/watched/gone.txt", b"g")]);
        let current = snapshot_with(&[("/watched/keep.txt", b"k")]);

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());

        let for_gone = find(&events, "/watched/gone.txt");
        assert_eq!(for_gone.len(), 1);
        assert_eq!(for_gone[0].kind, ChangeKind::Deleted);
    }

    #[test]
    fn modified_content_reports_signed_size_delta() {
        // Baseline "hello" (5 bytes) → current "hello world" (11 bytes).
        let baseline = snapshot_with(&[("/watched/a.txt", b"hello")]);
        let current = snapshot_with(&[("/watched/a.txt", b"hello world")]);

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            ChangeKind::Modified {
                is_honeyfile: false,
                size_delta: 6,
            }
        );
        assert_eq!(events[0].severity, Severity::Normal);
    }

    #[test]
    fn shrinking_file_has_negative_delta() {
        let baseline = snapshot_with(&[("/watched/a.txt", b"hello world")]);
        let current = snapshot_with(&[("/watched/a.txt", b"hello")]);

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());
        assert_eq!(
            events[0].kind,
            ChangeKind::Modified {
                is_honeyfile: false,
                size_delta: -6,
            }
        );
    }

    #[test]
    fn honeyfile_modification_is_elevated_regardless_of_delta() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mgr = HoneyfileManager::new(
            tmp.path().to_path_buf(),
            crate::core::config::HoneyfileConfig {
                count: 1,
                size_bytes: 128,
                directory: None,
                name_prefix: ".fis_decoy".to_string(),
            },
        );
        let honeyfiles = mgr.plant().unwrap();
        let decoy_path = honeyfiles.paths().next().unwrap().clone();
        let decoy_record = *honeyfiles.get(&decoy_path).unwrap();

        let mut baseline = Snapshot::empty(tmp.path());
        baseline.insert(decoy_path.clone(), decoy_record);

        // One-byte content change, same size: delta is 0 but severity elevates.
        let mut current = Snapshot::empty(tmp.path());
        let mut tampered = std::fs::read(&decoy_path).unwrap();
        tampered[0] ^= 0xff;
        current.insert(
            decoy_path.clone(),
            FileRecord {
                digest: hash_bytes(&tampered),
                size: decoy_record.size,
            },
        );

        let events = engine().diff(&baseline, &current, &honeyfiles);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            ChangeKind::Modified {
                is_honeyfile: true,
                size_delta: 0,
            }
        );
        assert!(events[0].is_elevated());
    }

    #[test]
    fn large_growth_is_elevated_without_honeyfile() {
        let small = vec![0u8; 10];
        let big = vec![1u8; 2_000_000];
        let mut baseline = Snapshot::empty("/watched");
        baseline.insert(PathBuf::from("/watched/grow.bin"), record(&small));
        let mut current = Snapshot::empty("/watched");
        current.insert(PathBuf::from("/watched/grow.bin"), record(&big));

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());

        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            ChangeKind::Modified {
                is_honeyfile: false,
                size_delta: 1_999_990,
            }
        );
        assert!(events[0].is_elevated());
    }

    #[test]
    fn large_shrink_is_elevated_too() {
        let big = vec![1u8; 2_000_000];
        let small = vec![0u8; 10];
        let mut baseline = Snapshot::empty("/watched");
        baseline.insert(PathBuf::from("/watched/shrink.bin"), record(&big));
        let mut current = Snapshot::empty("/watched");
        current.insert(PathBuf::from("/watched/shrink.bin"), record(&small));

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());
        assert!(events[0].is_elevated());
    }

    #[test]
    fn delta_at_threshold_is_not_elevated() {
        // Threshold is exceeded strictly: |delta| == threshold stays normal.
        let engine = DiffEngine::new(100);
        let mut baseline = Snapshot::empty("/watched");
        baseline.insert(
            PathBuf::from("/watched/edge.bin"),
            FileRecord {
                digest: hash_bytes(b"before"),
                size: 0,
            },
        );
        let mut current = Snapshot::empty("/watched");
        current.insert(
            PathBuf::from("/watched/edge.bin"),
            FileRecord {
                digest: hash_bytes(b"after"),
                size: 100,
            },
        );

        let events = engine.diff(&baseline, &current, &HoneyfileSet::default());
        assert_eq!(events[0].severity, Severity::Normal);
    }

    #[test]
    fn deleted_honeyfile_is_elevated() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mgr = HoneyfileManager::new(
            tmp.path().to_path_buf(),
            crate::core::config::HoneyfileConfig::default(),
        );
        let honeyfiles = mgr.plant().unwrap();
        let decoy_path = honeyfiles.paths().next().unwrap().clone();

        let mut baseline = Snapshot::empty(tmp.path());
        baseline.insert(decoy_path.clone(), *honeyfiles.get(&decoy_path).unwrap());
        let current = Snapshot::empty(tmp.path());

        let events = engine().diff(&baseline, &current, &honeyfiles);
        assert_eq!(events[0].kind, ChangeKind::Deleted);
        assert!(events[0].is_elevated());
    }

    #[test]
    fn all_categories_enumerated_in_one_pass() {
        let baseline = snapshot_with(&[
            ("/watched/stays.txt", b"same"),
            ("/watched/edited.txt", b"v1"),
            ("/watched/removed.txt", b"bye"),
        ]);
        let current = snapshot_with(&[
            ("/watched/stays.txt", b"same"),
            ("/watched/edited.txt", b"v2!"),
            ("/watched/brand_new.txt", b"hi"),
        ]);

        let events = engine().diff(&baseline, &current, &HoneyfileSet::default());

        assert_eq!(events.len(), 4);
        assert_eq!(find(&events, "/watched/stays.txt")[0].kind, ChangeKind::Unchanged);
        assert_eq!(find(&events, "/watched/removed.txt")[0].kind, ChangeKind::Deleted);
        assert_eq!(find(&events, "/watched/brand_new.txt")[0].kind, ChangeKind::Added);
        assert!(matches!(
            find(&events, "/watched/edited.txt")[0].kind,
            ChangeKind::Modified { .. }
        ));
        // No path appears in more than one event.
        let mut paths: Vec<_> = events.iter().map(|e| &e.path).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), events.len());
    }

    #[test]
    fn diff_does_not_mutate_inputs() {
        let baseline = snapshot_with(&[("/watched/a.txt", b"v1")]);
        let current = snapshot_with(&[("/watched/a.txt", b"v2")]);
        let baseline_before = baseline.clone();
        let current_before = current.clone();

        let _ = engine().diff(&baseline, &current, &HoneyfileSet::default());

        assert_eq!(baseline, baseline_before);
        assert_eq!(current, current_before);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_snapshot() -> impl Strategy<Value = Snapshot> {
            proptest::collection::btree_map(
                "[a-z]{1,8}",
                proptest::collection::vec(any::<u8>(), 0..64),
                0..12,
            )
            .prop_map(|entries| {
                let mut snapshot = Snapshot::empty("/watched");
                for (name, content) in entries {
                    snapshot.insert(PathBuf::from(format!("/watched/{name}")), record(&content));
                }
                snapshot
            })
        }

        proptest! {
            #[test]
            fn identical_snapshots_yield_no_changes(snapshot in arb_snapshot()) {
                let events = engine().diff(&snapshot, &snapshot, &HoneyfileSet::default());
                prop_assert_eq!(events.len(), snapshot.len());
                prop_assert!(events.iter().all(|e| !e.is_change()));
            }

            #[test]
            fn every_path_classified_exactly_once(
                baseline in arb_snapshot(),
                current in arb_snapshot(),
            ) {
                let events = engine().diff(&baseline, &current, &HoneyfileSet::default());
                let union: std::collections::BTreeSet<_> = baseline
                    .paths()
                    .chain(current.paths())
                    .cloned()
                    .collect();
                prop_assert_eq!(events.len(), union.len());
                let mut seen: Vec<_> = events.iter().map(|e| e.path.clone()).collect();
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), events.len());
            }
        }
    }
}
