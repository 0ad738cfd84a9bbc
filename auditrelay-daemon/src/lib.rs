//! Daemon runtime, control plane and host process adapters.

pub mod control;
mod error;
pub mod process;
mod runtime;

pub use control::{start, status, stop, ControlReport};
pub use error::DaemonError;
pub use process::{HostProcessRegistry, Launcher, ProcessLauncher, ProcessRegistry};
pub use runtime::{run, start_blocking, Daemon, ExitReason, ENV_LOG_FORMAT};
