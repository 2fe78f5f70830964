//! FIS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, FisError>;

/// Top-level error type for File Integrity Sentry.
#[derive(Debug, Error)]
pub enum FisError {
    #[error("[FIS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[FIS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[FIS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[FIS-2001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[FIS-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[FIS-2102] corrupt baseline at {path}: {details}")]
    CorruptBaseline { path: PathBuf, details: String },

    #[error("[FIS-3001] honeyfile setup failed at {path}: {details}")]
    HoneyfileSetup { path: PathBuf, details: String },

    #[error("[FIS-3002] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[FIS-3003] interrupted during {context}")]
    Interrupted { context: &'static str },

    #[error("[FIS-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl FisError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "FIS-1001",
            Self::MissingConfig { .. } => "FIS-1002",
            Self::ConfigParse { .. } => "FIS-1003",
            Self::Io { .. } => "FIS-2001",
            Self::Serialization { .. } => "FIS-2101",
            Self::CorruptBaseline { .. } => "FIS-2102",
            Self::HoneyfileSetup { .. } => "FIS-3001",
            Self::ChannelClosed { .. } => "FIS-3002",
            Self::Interrupted { .. } => "FIS-3003",
            Self::Runtime { .. } => "FIS-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Per-file IO races (file vanished between listing and hashing) are the
    /// canonical retryable case; the next scan pass observes the new state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Whether the error must abort startup before the monitoring loop.
    #[must_use]
    pub const fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::HoneyfileSetup { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for FisError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for FisError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
