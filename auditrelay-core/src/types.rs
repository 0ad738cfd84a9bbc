//! Domain types and their fixed-width persisted records.
//!
//! Both durable records are plain text of a fixed width so they can live in
//! any key-value slot that stores a short string:
//!
//! ```text
//! checkpoint (20):  00000000000000004711
//! control    (50):  *STOPPED | *END | <job number:10><job user:10><job name:10><blank:20>
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of the persisted checkpoint record.
pub const CHECKPOINT_WIDTH: usize = 20;

/// Width of the persisted control state record.
pub const CONTROL_WIDTH: usize = 50;

/// Width of each field of a packed run identity.
pub const IDENTITY_FIELD_WIDTH: usize = 10;

pub const STOPPED_TOKEN: &str = "*STOPPED";
pub const STOPPING_TOKEN: &str = "*END";

/// Job name recorded for every daemon run.
pub const DAEMON_JOB_NAME: &str = "AUDITRELAY";

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Last journal sequence number known to have been processed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Checkpoint(pub u64);

impl Checkpoint {
    pub const ZERO: Checkpoint = Checkpoint(0);

    /// Zero-padded 20-character record.
    pub fn encode(self) -> String {
        format!("{:0width$}", self.0, width = CHECKPOINT_WIDTH)
    }

    /// Parse a checkpoint record. Blank padding is tolerated; anything
    /// non-numeric is `None`.
    pub fn decode(raw: &str) -> Option<Checkpoint> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        trimmed.parse().ok().map(Checkpoint)
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Checkpoint {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ---------------------------------------------------------------------------
// Audit event
// ---------------------------------------------------------------------------

/// One journal entry, already rendered into its wire syslog text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub sequence: Checkpoint,
    pub payload: String,
    /// Journal entry type code (e.g. `PW`, `AF`), when the source provides it.
    pub entry_type: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl AuditEvent {
    pub fn new(sequence: impl Into<Checkpoint>, payload: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
            payload: payload.into(),
            entry_type: None,
            recorded_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run identity / control state
// ---------------------------------------------------------------------------

/// Identifies one daemon run: host job number plus the submitting user and job name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    pub job_number: u32,
    pub job_user: String,
    pub job_name: String,
}

impl RunIdentity {
    /// Build an identity; user and name are squeezed into their 10-column fields.
    pub fn new(job_number: u32, job_user: &str, job_name: &str) -> Self {
        Self {
            job_number,
            job_user: pack_field(job_user),
            job_name: pack_field(job_name),
        }
    }

    /// Identity for a daemon process owned by the current user.
    pub fn for_pid(pid: u32) -> Self {
        let user = ["USER", "LOGNAME", "USERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(pid, &user, DAEMON_JOB_NAME)
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.job_number, self.job_user, self.job_name)
    }
}

/// Whitespace-free ASCII, at most one field wide.
fn pack_field(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c.is_ascii() { c } else { '?' })
        .take(IDENTITY_FIELD_WIDTH)
        .collect()
}

/// Persisted daemon lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ControlState {
    #[default]
    Stopped,
    Running(RunIdentity),
    Stopping,
}

impl ControlState {
    /// Fixed-width 50-character record.
    pub fn encode(&self) -> String {
        let body = match self {
            ControlState::Stopped => STOPPED_TOKEN.to_string(),
            ControlState::Stopping => STOPPING_TOKEN.to_string(),
            ControlState::Running(id) => format!(
                "{:0nw$}{:<w$}{:<w$}",
                id.job_number,
                id.job_user,
                id.job_name,
                nw = IDENTITY_FIELD_WIDTH,
                w = IDENTITY_FIELD_WIDTH,
            ),
        };
        format!("{:<width$}", body, width = CONTROL_WIDTH)
    }

    /// Parse a control record. `None` for blank or unrecognised content.
    pub fn decode(raw: &str) -> Option<ControlState> {
        let record = raw.trim_end_matches(['\r', '\n']);
        let token = record.trim();
        if token.is_empty() {
            return None;
        }
        if token.starts_with('*') {
            return match token {
                STOPPED_TOKEN => Some(ControlState::Stopped),
                STOPPING_TOKEN => Some(ControlState::Stopping),
                _ => None,
            };
        }

        let field = |from: usize| -> Option<&str> {
            let to = (from + IDENTITY_FIELD_WIDTH).min(record.len());
            if from >= record.len() {
                return Some("");
            }
            record.get(from..to).map(str::trim)
        };

        let number = field(0)?;
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let job_number = number.parse().ok()?;
        let job_user = field(IDENTITY_FIELD_WIDTH)?.to_string();
        let job_name = field(2 * IDENTITY_FIELD_WIDTH)?.to_string();

        Some(ControlState::Running(RunIdentity {
            job_number,
            job_user,
            job_name,
        }))
    }

    pub fn identity(&self) -> Option<&RunIdentity> {
        match self {
            ControlState::Running(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlState::Stopped => write!(f, "STOPPED"),
            ControlState::Running(id) => write!(f, "RUNNING ({id})"),
            ControlState::Stopping => write!(f, "STOPPING"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
