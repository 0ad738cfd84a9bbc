//! Error types for auditrelay-forward.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a forwarding cycle before any event is read.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The collector address did not resolve or no socket could be opened.
    #[error("cannot open syslog transport to {destination}: {source}")]
    TransportInit {
        destination: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fault raised by an event source mid-stream. Ends the stream early.
#[derive(Debug, Error)]
pub enum SourceError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A journal line that is not a valid entry.
    #[error("malformed journal entry at {path}:{line}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The journal went backwards.
    #[error("journal out of order at {path}:{line}: sequence {found} after {previous}")]
    OutOfOrder {
        path: PathBuf,
        line: usize,
        previous: u64,
        found: u64,
    },
}

/// Convenience constructor for [`SourceError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
