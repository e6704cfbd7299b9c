//! DTE-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DteError>;

/// Top-level error type for the daily text engine.
#[derive(Debug, Error)]
pub enum DteError {
    #[error("[DTE-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DTE-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DTE-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DTE-2001] entry source unavailable at {path}: {details}")]
    DataUnavailable { path: PathBuf, details: String },

    #[error("[DTE-2002] invalid date key {raw:?} (expected zero-padded MM-DD)")]
    InvalidDateKey { raw: String },

    #[error("[DTE-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DTE-2102] cursor persistence failure at {path}: {details}")]
    Persistence { path: PathBuf, details: String },

    #[error("[DTE-3001] precise scheduling denied by host: {details}")]
    PermissionDenied { details: String },

    #[error("[DTE-3002] scheduling failed: {details}")]
    SchedulingFailed { details: String },

    #[error("[DTE-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DTE-3102] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[DTE-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DteError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DTE-1001",
            Self::MissingConfig { .. } => "DTE-1002",
            Self::ConfigParse { .. } => "DTE-1003",
            Self::DataUnavailable { .. } => "DTE-2001",
            Self::InvalidDateKey { .. } => "DTE-2002",
            Self::Serialization { .. } => "DTE-2101",
            Self::Persistence { .. } => "DTE-2102",
            Self::PermissionDenied { .. } => "DTE-3001",
            Self::SchedulingFailed { .. } => "DTE-3002",
            Self::Io { .. } => "DTE-3101",
            Self::ChannelClosed { .. } => "DTE-3102",
            Self::Runtime { .. } => "DTE-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DataUnavailable { .. }
                | Self::Persistence { .. }
                | Self::SchedulingFailed { .. }
                | Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
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

impl From<serde_json::Error> for DteError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DteError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
