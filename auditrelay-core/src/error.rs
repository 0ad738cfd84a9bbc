//! Error types for auditrelay-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the fallible store primitives.
///
/// The [`CheckpointStore`](crate::store::CheckpointStore) and
/// [`ControlStore`](crate::store::ControlStore) trait methods never surface
/// these; they log and fall back instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the record path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record exists but does not decode.
    #[error("corrupt record at {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

/// Errors while loading [`RelayConfig`](crate::config::RelayConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error, with the config file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override holds a value of the wrong shape.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
