//! Data directory layout.
//!
//! ```text
//! ~/.auditrelay/
//!   config.yaml
//!   journal.jsonl        (default journal export)
//!   state/
//!     checkpoint         (20-char record)
//!     control            (50-char record)
//!   logs/
//!     daemon.log
//!     daemon-err.log
//! ```
//!
//! Every helper takes an explicit `home` so tests can root everything in a
//! `TempDir`; [`home`] is the only place that consults `dirs::home_dir()`.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const CONFIG_FILE: &str = "config.yaml";
pub const JOURNAL_FILE: &str = "journal.jsonl";
pub const CHECKPOINT_FILE: &str = "checkpoint";
pub const CONTROL_FILE: &str = "control";
pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";

pub fn relay_root(home: &Path) -> PathBuf {
    home.join(".auditrelay")
}

pub fn config_path(home: &Path) -> PathBuf {
    relay_root(home).join(CONFIG_FILE)
}

pub fn default_journal_path(home: &Path) -> PathBuf {
    relay_root(home).join(JOURNAL_FILE)
}

pub fn state_dir(home: &Path) -> PathBuf {
    relay_root(home).join("state")
}

pub fn checkpoint_path(home: &Path) -> PathBuf {
    state_dir(home).join(CHECKPOINT_FILE)
}

pub fn control_path(home: &Path) -> PathBuf {
    state_dir(home).join(CONTROL_FILE)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    relay_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
