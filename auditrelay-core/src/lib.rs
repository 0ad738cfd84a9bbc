//! auditrelay core library: domain types, durable stores, configuration.
//!
//! - [`types`]: checkpoint, audit event, control state and their fixed-width records
//! - [`store`]: checkpoint and control state stores
//! - [`config`]: `config.yaml` plus environment overrides
//! - [`paths`]: data directory layout

pub mod config;
pub mod error;
pub mod paths;
pub mod store;
pub mod types;

pub use config::RelayConfig;
pub use error::{ConfigError, StoreError};
pub use store::{CheckpointStore, ControlStore, FileCheckpointStore, FileControlStore};
pub use types::{AuditEvent, Checkpoint, ControlState, RunIdentity};
