//! `auditrelay start|stop|status`: operator commands over the control record.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use auditrelay_core::{paths, FileCheckpointStore, FileControlStore};
use auditrelay_daemon::{ControlReport, HostProcessRegistry, ProcessLauncher};

pub fn start(json: bool) -> Result<()> {
    let home = home()?;
    let launcher = ProcessLauncher::current_exe(&home).context("failed to locate own binary")?;
    let report = auditrelay_daemon::start(&FileControlStore::at(&home), &launcher)
        .context("failed to start audit relay")?;
    print_report(&report, json)
}

pub fn stop(json: bool) -> Result<()> {
    let home = home()?;
    let report = auditrelay_daemon::stop(&FileControlStore::at(&home));
    print_report(&report, json)
}

pub fn status(json: bool) -> Result<()> {
    let home = home()?;
    let report = auditrelay_daemon::status(
        &FileControlStore::at(&home),
        &FileCheckpointStore::at(&home),
        &HostProcessRegistry,
    );
    print_report(&report, json)
}

fn home() -> Result<PathBuf> {
    paths::home().context("could not determine home directory")
}

fn print_report(report: &ControlReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed to render report JSON")?
        );
        return Ok(());
    }

    let text = report.to_string();
    let line = match report {
        ControlReport::Started { .. } | ControlReport::Running { .. } => text.green(),
        ControlReport::AlreadyRunning { .. }
        | ControlReport::StopRequested { .. }
        | ControlReport::Stopping => text.yellow(),
        ControlReport::Inconsistent { .. } => text.red().bold(),
        ControlReport::Stopped | ControlReport::NotRunning => text.normal(),
    };
    println!("{line}");
    Ok(())
}
