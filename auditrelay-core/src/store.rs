//! Durable checkpoint and control state records.
//!
//! # Persistence policy
//!
//! Both stores are best-effort. `load`/`get` fail open: a missing or corrupt
//! checkpoint reads as [`Checkpoint::ZERO`] (replay from the beginning) and a
//! missing or corrupt control record reads as [`ControlState::Stopped`].
//! `save`/`set` log write failures and carry on. Neither ever crashes the
//! daemon or a control command. Callers that want the failure itself use the
//! fallible `read`/`write` primitives on the file-backed types.
//!
//! # Write flow
//!
//! Encode → `<name>.<pid>.tmp` sibling → `chmod 0600` → `rename`. Readers
//! never see a torn record; concurrent writers are last-writer-wins.

use std::path::{Path, PathBuf};

use crate::error::{io_err, StoreError};
use crate::paths::{checkpoint_path, control_path};
use crate::types::{Checkpoint, ControlState};

/// Holds the last advanced sequence number.
pub trait CheckpointStore {
    /// Last persisted checkpoint, or zero when absent or unreadable.
    fn load(&self) -> Checkpoint;

    /// Persist `checkpoint`. Failures are logged, never returned.
    fn save(&self, checkpoint: Checkpoint);
}

/// Holds the daemon lifecycle record. No locking.
pub trait ControlStore {
    fn get(&self) -> ControlState;
    fn set(&self, state: &ControlState);
}

// ---------------------------------------------------------------------------
// Checkpoint file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.auditrelay/state/checkpoint`
    pub fn at(home: &Path) -> Self {
        Self::new(checkpoint_path(home))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no record has been written yet.
    pub fn read(&self) -> Result<Option<Checkpoint>, StoreError> {
        let Some(raw) = read_record(&self.path)? else {
            return Ok(None);
        };
        Checkpoint::decode(&raw)
            .map(Some)
            .ok_or_else(|| StoreError::Corrupt {
                path: self.path.clone(),
                detail: format!("non-numeric checkpoint {:?}", raw.trim()),
            })
    }

    pub fn write(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        write_record(&self.path, &checkpoint.encode())
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Checkpoint {
        match self.read() {
            Ok(Some(checkpoint)) => checkpoint,
            Ok(None) => {
                tracing::info!("no checkpoint recorded, starting from the beginning");
                Checkpoint::ZERO
            }
            Err(err) => {
                tracing::warn!("{err}; starting from the beginning");
                Checkpoint::ZERO
            }
        }
    }

    fn save(&self, checkpoint: Checkpoint) {
        if let Err(err) = self.write(checkpoint) {
            tracing::warn!("checkpoint {checkpoint} not saved: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Control file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileControlStore {
    path: PathBuf,
}

impl FileControlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.auditrelay/state/control`
    pub fn at(home: &Path) -> Self {
        Self::new(control_path(home))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Option<ControlState>, StoreError> {
        let Some(raw) = read_record(&self.path)? else {
            return Ok(None);
        };
        ControlState::decode(&raw)
            .map(Some)
            .ok_or_else(|| StoreError::Corrupt {
                path: self.path.clone(),
                detail: format!("unrecognised control record {:?}", raw.trim()),
            })
    }

    pub fn write(&self, state: &ControlState) -> Result<(), StoreError> {
        write_record(&self.path, &state.encode())
    }
}

impl ControlStore for FileControlStore {
    fn get(&self) -> ControlState {
        match self.read() {
            Ok(state) => state.unwrap_or_default(),
            Err(err) => {
                tracing::warn!("{err}; treating daemon as stopped");
                ControlState::Stopped
            }
        }
    }

    fn set(&self, state: &ControlState) {
        if let Err(err) = self.write(state) {
            tracing::warn!("control state {state} not saved: {err}");
        }
    }
}

// ---------------------------------------------------------------------------
// Record I/O
// ---------------------------------------------------------------------------

fn read_record(path: &Path) -> Result<Option<String>, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

fn write_record(path: &Path, record: &str) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
            set_dir_permissions(dir)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let tmp = path.with_file_name(format!("{file_name}.{}.tmp", std::process::id()));

    std::fs::write(&tmp, record).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, err));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
