use std::path::PathBuf;

use auditrelay_core::{ConfigError, RunIdentity};
use thiserror::Error;

/// Error surface for the daemon runtime, control plane and process adapters.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to launch daemon: {0}")]
    Launch(String),

    #[error("another daemon run is active as job {run}")]
    AlreadyRunning { run: RunIdentity },

    #[error("daemon runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
