//! auditrelay: forward audit journal entries to a syslog collector.
//!
//! # Usage
//!
//! ```text
//! auditrelay start          # submit the background daemon
//! auditrelay stop           # ask it to finish after the current cycle
//! auditrelay status [--json]
//! ```
//!
//! Actions are case-insensitive, so `auditrelay START` works too.

mod commands;

use anyhow::Result;
use clap::{Parser, ValueEnum};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "auditrelay",
    version,
    about = "Forward audit journal entries to a remote syslog collector",
    long_about = None,
)]
struct Cli {
    #[arg(value_enum, ignore_case = true)]
    action: Action,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    /// Launch the forwarding daemon unless one is already recorded.
    Start,
    /// Request a cooperative stop.
    Stop,
    /// Show daemon state and the current checkpoint.
    Status,
    /// Host the daemon in the foreground.
    #[value(hide = true)]
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.action {
        Action::Start => commands::control::start(cli.json),
        Action::Stop => commands::control::stop(cli.json),
        Action::Status => commands::control::status(cli.json),
        Action::Run => commands::daemon::run(),
    }
}
