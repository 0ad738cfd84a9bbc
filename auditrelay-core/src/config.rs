//! Relay configuration: `~/.auditrelay/config.yaml` plus environment overrides.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! Environment variables win over the file:
//!
//! | variable                        | field                   |
//! |---------------------------------|-------------------------|
//! | `AUDITRELAY_SYSLOG_HOST`        | `syslog.host`           |
//! | `AUDITRELAY_SYSLOG_PORT`        | `syslog.port`           |
//! | `AUDITRELAY_JOURNAL`            | `journal.path`          |
//! | `AUDITRELAY_ENTRY_TYPES`        | `journal.entry_types`   |
//! | `AUDITRELAY_POLL_INTERVAL_SECS` | `polling.interval_secs` |
//! | `AUDITRELAY_STOP_CHECK_MS`      | `polling.stop_check_ms` |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths::{config_path, default_journal_path};

pub const ENV_SYSLOG_HOST: &str = "AUDITRELAY_SYSLOG_HOST";
pub const ENV_SYSLOG_PORT: &str = "AUDITRELAY_SYSLOG_PORT";
pub const ENV_JOURNAL: &str = "AUDITRELAY_JOURNAL";
pub const ENV_ENTRY_TYPES: &str = "AUDITRELAY_ENTRY_TYPES";
pub const ENV_POLL_INTERVAL_SECS: &str = "AUDITRELAY_POLL_INTERVAL_SECS";
pub const ENV_STOP_CHECK_MS: &str = "AUDITRELAY_STOP_CHECK_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub syslog: SyslogTarget,
    pub journal: JournalConfig,
    pub polling: PollingConfig,
}

/// UDP collector address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogTarget {
    pub host: String,
    pub port: u16,
}

impl Default for SyslogTarget {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 514,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct JournalConfig {
    /// `None` resolves to `<home>/.auditrelay/journal.jsonl`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Only forward these journal entry types; empty forwards everything.
    pub entry_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Pause between forwarding cycles.
    pub interval_secs: u64,
    /// How often the daemon re-reads the control record while waiting.
    pub stop_check_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            stop_check_ms: 1000,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Never zero, so the wait loop cannot spin.
    pub fn stop_check(&self) -> Duration {
        Duration::from_millis(self.stop_check_ms.max(1))
    }
}

impl RelayConfig {
    /// Load `<home>/.auditrelay/config.yaml` and apply the process environment.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(&config_path(home))?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a config file; a missing file yields the defaults.
    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from `lookup` (the environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |var: &'static str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (var, v))
        };

        if let Some((_, host)) = get(ENV_SYSLOG_HOST) {
            self.syslog.host = host;
        }
        if let Some((var, port)) = get(ENV_SYSLOG_PORT) {
            self.syslog.port = parse_env(var, port)?;
        }
        if let Some((_, path)) = get(ENV_JOURNAL) {
            self.journal.path = Some(PathBuf::from(path));
        }
        if let Some((_, types)) = get(ENV_ENTRY_TYPES) {
            self.journal.entry_types = split_entry_types(&types);
        }
        if let Some((var, secs)) = get(ENV_POLL_INTERVAL_SECS) {
            self.polling.interval_secs = parse_env(var, secs)?;
        }
        if let Some((var, ms)) = get(ENV_STOP_CHECK_MS) {
            self.polling.stop_check_ms = parse_env(var, ms)?;
        }
        Ok(())
    }

    /// Journal export path, defaulting under `home`.
    pub fn journal_path(&self, home: &Path) -> PathBuf {
        self.journal
            .path
            .clone()
            .unwrap_or_else(|| default_journal_path(home))
    }

    /// Configured entry types with blanks removed.
    pub fn entry_types(&self) -> Vec<String> {
        self.journal
            .entry_types
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// `"PW, AF,,CA"` → `["PW", "AF", "CA"]`
pub fn split_entry_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
