//! `auditrelay run`: the daemon itself, as launched by `start`.

use anyhow::{Context, Result};

use auditrelay_core::paths;
use auditrelay_daemon::start_blocking;

pub fn run() -> Result<()> {
    let home = paths::home().context("could not determine home directory")?;
    start_blocking(&home).context("daemon exited with error")
}
