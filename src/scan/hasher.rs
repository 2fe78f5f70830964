//! Streaming content hasher: SHA-256 over fixed-size chunks.
//!
//! Files are read in bounded chunks so a multi-gigabyte file uses constant
//! working memory. The digest is deterministic over byte content alone —
//! inode, mtime, and path play no part.

#![allow(missing_docs)]

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::core::errors::{FisError, Result};

/// Read buffer size for streaming hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// 32-byte SHA-256 content digest.
///
/// Persisted as lowercase hex so the baseline file stays readable and
/// round-trips the digest exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileDigest([u8; 32]);

impl FileDigest {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 chars).
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.0.iter().fold(String::with_capacity(64), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
    }

    /// Parse a 64-char hex string back into a digest.
    pub fn from_hex(raw: &str) -> Option<Self> {
        if raw.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, slot) in out.iter_mut().enumerate() {
            let pair = raw.get(i * 2..i * 2 + 2)?;
            *slot = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for FileDigest {
    type Err = FisError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(raw).ok_or_else(|| FisError::Serialization {
            context: "digest_hex",
            details: format!("invalid digest {raw:?}"),
        })
    }
}

impl Serialize for FileDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid digest {raw:?}")))
    }
}

/// Hash a file's content in bounded chunks.
///
/// Fails with an IO error if the path does not exist, is not readable, or is
/// removed mid-read (race with the filesystem). Callers treat this as a
/// recoverable per-file condition — files legitimately disappear between
/// being listed and being read.
pub fn hash_file(path: &Path) -> Result<FileDigest> {
    let mut file = File::open(path).map_err(|e| FisError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).map_err(|e| FisError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(FileDigest(hasher.finalize().into()))
}

/// Hash an in-memory byte slice (honeyfile registration, tests).
#[must_use]
pub fn hash_bytes(data: &[u8]) -> FileDigest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    FileDigest(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn digest_deterministic_across_handles() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, b"hello integrity").unwrap();

        let d1 = hash_file(&path).unwrap();
        let d2 = hash_file(&path).unwrap();
        assert_eq!(d1, d2);
        assert_eq!(d1, hash_bytes(b"hello integrity"));
    }

    #[test]
    fn digest_changes_on_single_byte_edit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        let before = hash_file(&path).unwrap();

        fs::write(&path, b"hellp").unwrap();
        let after = hash_file(&path).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn digest_matches_known_sha256_vector() {
        // SHA-256 of the empty input.
        let empty = hash_bytes(b"");
        assert_eq!(
            empty.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn large_file_hashed_across_chunk_boundary() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.bin");
        // Three chunks plus a tail.
        let data = vec![0xa5u8; CHUNK_SIZE * 3 + 17];
        fs::write(&path, &data).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = hash_file(Path::new("/definitely/not/here.bin")).unwrap_err();
        assert_eq!(err.code(), "FIS-2001");
        assert!(err.is_retryable());
    }

    #[test]
    fn hex_roundtrip() {
        let digest = hash_bytes(b"roundtrip");
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(FileDigest::from_hex(&hex), Some(digest));
        assert_eq!(hex.parse::<FileDigest>().unwrap(), digest);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(FileDigest::from_hex("abc").is_none());
        assert!(FileDigest::from_hex(&"zz".repeat(32)).is_none());
    }

    #[test]
    fn serde_uses_hex_encoding() {
        let digest = hash_bytes(b"serde");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{}\"", digest.to_hex()));
        let parsed: FileDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, digest);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn hex_roundtrip_holds_for_arbitrary_content(data: Vec<u8>) {
                let digest = hash_bytes(&data);
                prop_assert_eq!(FileDigest::from_hex(&digest.to_hex()), Some(digest));
            }

            #[test]
            fn digests_stable_for_equal_content(data: Vec<u8>) {
                prop_assert_eq!(hash_bytes(&data), hash_bytes(&data));
            }
        }
    }
}
