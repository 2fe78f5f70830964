//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{FisError, Result};

/// Default re-scan interval between integrity passes.
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;
/// Default size-delta threshold above which a modification is elevated (1 MiB).
pub const DEFAULT_SIZE_DELTA_THRESHOLD_BYTES: u64 = 1_048_576;
/// Default number of honeyfile decoys planted at startup.
pub const DEFAULT_HONEYFILE_COUNT: usize = 1;

/// Full sentry configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub honeyfile: HoneyfileConfig,
    pub paths: PathsConfig,
}

/// Scan behavior: what to walk, how often, and when a change is anomalous.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Root of the monitored tree. One sentry instance per root.
    pub root_path: PathBuf,
    /// Seconds between the end of one scan pass and the start of the next.
    pub scan_interval_secs: u64,
    /// Absolute size change (bytes) above which a modification is elevated.
    pub size_delta_threshold_bytes: u64,
    pub max_depth: usize,
    pub parallelism: usize,
    /// Symlinks are never followed by default (avoids cycles and escapes
    /// from the monitored root). Targets reachable only through a link are
    /// not part of the tree.
    pub follow_symlinks: bool,
    pub excluded_paths: Vec<PathBuf>,
}

/// Honeyfile decoy placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HoneyfileConfig {
    pub count: usize,
    pub size_bytes: u64,
    /// Directory to plant decoys in. `None` plants them at the monitored root.
    pub directory: Option<PathBuf>,
    /// Filename prefix; operators can pick something enticing per deployment.
    pub name_prefix: String,
}

/// Filesystem paths used by the sentry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub baseline_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            size_delta_threshold_bytes: DEFAULT_SIZE_DELTA_THRESHOLD_BYTES,
            max_depth: 64,
            parallelism: std::thread::available_parallelism()
                .map_or(2, |n| n.get().saturating_div(2).max(1)),
            follow_symlinks: false,
            excluded_paths: Vec::new(),
        }
    }
}

impl Default for HoneyfileConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_HONEYFILE_COUNT,
            size_bytes: 4096,
            directory: None,
            name_prefix: ".fis_decoy".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[FIS-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("fis").join("config.toml");
        let data = home_dir.join(".local").join("share").join("fis");
        Self {
            config_file: cfg,
            baseline_file: data.join("baseline.json"),
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from the default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| FisError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(FisError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// Uses FNV-1a for cross-process-stable hashing (no `DefaultHasher` whose
    /// seed may vary across Rust releases).
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // monitor
        if let Some(raw) = env_var("FIS_MONITOR_ROOT_PATH") {
            self.monitor.root_path = PathBuf::from(raw);
        }
        set_env_u64(
            "FIS_MONITOR_SCAN_INTERVAL_SECS",
            &mut self.monitor.scan_interval_secs,
        )?;
        set_env_u64(
            "FIS_MONITOR_SIZE_DELTA_THRESHOLD_BYTES",
            &mut self.monitor.size_delta_threshold_bytes,
        )?;
        set_env_usize("FIS_MONITOR_MAX_DEPTH", &mut self.monitor.max_depth)?;
        set_env_usize("FIS_MONITOR_PARALLELISM", &mut self.monitor.parallelism)?;
        set_env_bool(
            "FIS_MONITOR_FOLLOW_SYMLINKS",
            &mut self.monitor.follow_symlinks,
        )?;

        // honeyfile
        set_env_usize("FIS_HONEYFILE_COUNT", &mut self.honeyfile.count)?;
        set_env_u64("FIS_HONEYFILE_SIZE_BYTES", &mut self.honeyfile.size_bytes)?;
        if let Some(raw) = env_var("FIS_HONEYFILE_DIRECTORY") {
            self.honeyfile.directory = Some(PathBuf::from(raw));
        }
        if let Some(raw) = env_var("FIS_HONEYFILE_NAME_PREFIX") {
            self.honeyfile.name_prefix = raw;
        }

        // paths
        if let Some(raw) = env_var("FIS_BASELINE_FILE") {
            self.paths.baseline_file = PathBuf::from(raw);
        }
        if let Some(raw) = env_var("FIS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Normalize paths for consistent comparison against walk output.
    fn normalize_paths(&mut self) {
        strip_trailing_slash(&mut self.monitor.root_path);
        for path in &mut self.monitor.excluded_paths {
            strip_trailing_slash(path);
        }
        if let Some(dir) = &mut self.honeyfile.directory {
            strip_trailing_slash(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.scan_interval_secs == 0 {
            return Err(FisError::InvalidConfig {
                details: "monitor.scan_interval_secs must be >= 1".to_string(),
            });
        }
        if self.monitor.size_delta_threshold_bytes == 0 {
            return Err(FisError::InvalidConfig {
                details: "monitor.size_delta_threshold_bytes must be >= 1".to_string(),
            });
        }
        if self.monitor.parallelism == 0 {
            return Err(FisError::InvalidConfig {
                details: "monitor.parallelism must be >= 1".to_string(),
            });
        }
        if self.monitor.max_depth == 0 {
            return Err(FisError::InvalidConfig {
                details: "monitor.max_depth must be >= 1".to_string(),
            });
        }
        if self.monitor.root_path.as_os_str().is_empty() {
            return Err(FisError::InvalidConfig {
                details: "monitor.root_path must not be empty".to_string(),
            });
        }

        if self.honeyfile.count == 0 {
            return Err(FisError::InvalidConfig {
                details: "honeyfile.count must be >= 1".to_string(),
            });
        }
        // Decoys below 64 bytes carry too little entropy to be plausible data.
        if self.honeyfile.size_bytes < 64 {
            return Err(FisError::InvalidConfig {
                details: format!(
                    "honeyfile.size_bytes ({}) must be >= 64",
                    self.honeyfile.size_bytes
                ),
            });
        }
        if self.honeyfile.name_prefix.is_empty() {
            return Err(FisError::InvalidConfig {
                details: "honeyfile.name_prefix must not be empty".to_string(),
            });
        }
        if self.honeyfile.name_prefix.contains('/') {
            return Err(FisError::InvalidConfig {
                details: "honeyfile.name_prefix must not contain path separators".to_string(),
            });
        }

        Ok(())
    }

    /// Directory where honeyfiles are planted (configured dir or monitored root).
    #[must_use]
    pub fn honeyfile_directory(&self) -> PathBuf {
        self.honeyfile
            .directory
            .clone()
            .unwrap_or_else(|| self.monitor.root_path.clone())
    }
}

fn strip_trailing_slash(path: &mut PathBuf) {
    let s = path.to_string_lossy();
    if s.len() > 1
        && let Some(stripped) = s.strip_suffix('/')
    {
        *path = PathBuf::from(stripped);
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| FisError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_usize(name: &str, slot: &mut usize) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<usize>().map_err(|error| FisError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| FisError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
