//! Host process adapters: launching a detached daemon and probing liveness.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use auditrelay_core::{paths, RunIdentity};

use crate::error::{io_err, DaemonError};

/// Answers "does this run still exist on the host?"
pub trait ProcessRegistry: Send + Sync {
    fn is_alive(&self, run: &RunIdentity) -> bool;
}

/// Submits a daemon run and reports its identity without waiting for it.
pub trait Launcher {
    fn launch(&self) -> Result<RunIdentity, DaemonError>;
}

/// Liveness from the host process table. Zombies count as dead.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProcessRegistry;

impl ProcessRegistry for HostProcessRegistry {
    fn is_alive(&self, run: &RunIdentity) -> bool {
        pid_alive(run.job_number)
    }
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // `pid (comm) S ...`; comm may itself contain parentheses.
    let state = stat
        .rfind(')')
        .and_then(|end| stat[end + 1..].trim_start().chars().next());
    !matches!(state, None | Some('Z') | Some('X'))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn pid_alive(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}

/// Re-executes a binary with the hidden `run` action as a background process.
///
/// stdout/stderr are appended to `~/.auditrelay/logs/daemon.log` and
/// `daemon-err.log`; stdin is closed. On unix the child gets its own
/// process group so the operator's terminal signals don't reach it.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    home: PathBuf,
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(home: impl Into<PathBuf>, program: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            program: program.into(),
            args: vec!["run".to_string()],
        }
    }

    /// Launch the currently running executable.
    pub fn current_exe(home: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let program = std::env::current_exe().map_err(|e| io_err("current_exe", e))?;
        Ok(Self::new(home, program))
    }

    /// Replace the arguments passed to the program.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self) -> Result<RunIdentity, DaemonError> {
        let logs = paths::logs_dir(&self.home);
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
        let stdout = append_log(&paths::stdout_log_path(&self.home))?;
        let stderr = append_log(&paths::stderr_log_path(&self.home))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);
        detach(&mut command);

        let child = command.spawn().map_err(|err| {
            DaemonError::Launch(format!("{}: {err}", self.program.display()))
        })?;
        Ok(RunIdentity::for_pid(child.id()))
    }
}

fn append_log(path: &Path) -> Result<File, DaemonError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}
