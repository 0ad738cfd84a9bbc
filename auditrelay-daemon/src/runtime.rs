use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

use auditrelay_core::config::PollingConfig;
use auditrelay_core::{
    paths, ControlState, ControlStore, FileCheckpointStore, FileControlStore, RelayConfig,
    RunIdentity,
};
use auditrelay_forward::{run_cycle, CycleReport, JournalSource, SyslogForwarder};

use crate::error::{io_err, DaemonError};
use crate::process::{HostProcessRegistry, ProcessRegistry};

pub const ENV_LOG_FORMAT: &str = "AUDITRELAY_LOG_FORMAT";

/// Why the forwarding loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The control record asked for a stop.
    StopRequested,
    /// Ctrl-C, SIGTERM or an in-process shutdown broadcast.
    Shutdown,
    /// The control record now names a different run.
    Superseded(RunIdentity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopSignal {
    Continue,
    Stop,
    Superseded(RunIdentity),
}

impl LoopSignal {
    fn exit_reason(self) -> Option<ExitReason> {
        match self {
            LoopSignal::Continue => None,
            LoopSignal::Stop => Some(ExitReason::StopRequested),
            LoopSignal::Superseded(run) => Some(ExitReason::Superseded(run)),
        }
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon as the current process until stopped.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;
    let config = RelayConfig::load_at(&home)?;
    let daemon = Daemon::from_config(&home, &config);
    let identity = RunIdentity::for_pid(std::process::id());

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let serve_rx = shutdown_tx.subscribe();

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = wait_for_signal() => {
                    let name = signal?;
                    tracing::info!("received {name}, shutting down daemon");
                    let _ = shutdown.send(());
                    Ok(())
                }
            }
        })
    };

    let result = daemon.serve(&identity, &HostProcessRegistry, serve_rx).await;
    let _ = shutdown_tx.send(());
    handle_join("signal_handler", signal_handle.await)?;

    let reason = result?;
    tracing::info!(run = %identity, reason = ?reason, "audit relay stopped");
    Ok(())
}

/// The forwarding loop and the stores it owns.
#[derive(Debug, Clone)]
pub struct Daemon {
    control: FileControlStore,
    checkpoints: FileCheckpointStore,
    source: JournalSource,
    forwarder: SyslogForwarder,
    polling: PollingConfig,
}

impl Daemon {
    pub fn from_config(home: &Path, config: &RelayConfig) -> Self {
        Self {
            control: FileControlStore::at(home),
            checkpoints: FileCheckpointStore::at(home),
            source: JournalSource::new(config.journal_path(home))
                .with_entry_types(config.entry_types()),
            forwarder: SyslogForwarder::from(&config.syslog),
            polling: config.polling.clone(),
        }
    }

    /// Claim the control record for `identity`, then run cycles until the
    /// record, `shutdown` or a newer run says otherwise. A stop already
    /// pending at startup ends the run before the first cycle.
    ///
    /// # Errors
    /// [`DaemonError::AlreadyRunning`] when the record names another run that
    /// `registry` reports alive. Nothing is written in that case.
    pub async fn serve(
        &self,
        identity: &RunIdentity,
        registry: &dyn ProcessRegistry,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<ExitReason, DaemonError> {
        if !self.claim(identity, registry)? {
            tracing::info!(run = %identity, "stop requested before startup, exiting");
            self.release(identity);
            return Ok(ExitReason::StopRequested);
        }
        tracing::info!(
            run = %identity,
            destination = %self.forwarder.destination(),
            journal = %self.source.path().display(),
            interval_secs = self.polling.interval_secs,
            "audit relay started"
        );

        let reason = loop {
            if let Some(reason) = self.poll_signal(identity).exit_reason() {
                break reason;
            }
            self.cycle().await;
            if let Some(reason) = self.wait_for_next_cycle(identity, &mut shutdown).await {
                break reason;
            }
        };

        self.release(identity);
        Ok(reason)
    }

    /// `Ok(false)` when a stop is already pending; the record is left as is.
    fn claim(
        &self,
        identity: &RunIdentity,
        registry: &dyn ProcessRegistry,
    ) -> Result<bool, DaemonError> {
        match self.control.get() {
            ControlState::Stopping => return Ok(false),
            ControlState::Running(run) if &run != identity && registry.is_alive(&run) => {
                return Err(DaemonError::AlreadyRunning { run });
            }
            _ => {}
        }
        self.control.set(&ControlState::Running(identity.clone()));
        Ok(true)
    }

    fn poll_signal(&self, identity: &RunIdentity) -> LoopSignal {
        match self.control.get() {
            ControlState::Running(run) if &run == identity => LoopSignal::Continue,
            ControlState::Running(run) => LoopSignal::Superseded(run),
            ControlState::Stopping | ControlState::Stopped => LoopSignal::Stop,
        }
    }

    /// Mark the record stopped unless a newer run has taken it over.
    fn release(&self, identity: &RunIdentity) {
        match self.control.get() {
            ControlState::Running(run) if &run != identity => {
                tracing::info!(superseded_by = %run, "leaving control record to the newer run");
            }
            _ => self.control.set(&ControlState::Stopped),
        }
    }

    async fn cycle(&self) -> Option<CycleReport> {
        let checkpoints = self.checkpoints.clone();
        let source = self.source.clone();
        let forwarder = self.forwarder.clone();

        let joined = tokio::task::spawn_blocking(move || {
            run_cycle(&checkpoints, &source, || forwarder.open())
        })
        .await;

        match joined {
            Ok(Ok(report)) => {
                tracing::debug!(
                    start = %report.start,
                    end = %report.end,
                    attempted = report.attempted,
                    failed = report.failed,
                    "cycle finished"
                );
                Some(report)
            }
            Ok(Err(err)) => {
                tracing::error!("forwarding cycle aborted: {err}");
                None
            }
            Err(err) => {
                tracing::error!("forwarding cycle task failed: {err}");
                None
            }
        }
    }

    /// Sleep out the polling interval, re-reading the control record every
    /// `stop_check`. `None` means run the next cycle.
    async fn wait_for_next_cycle(
        &self,
        identity: &RunIdentity,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<ExitReason> {
        let deadline = Instant::now() + self.polling.interval();
        let mut check = tokio::time::interval(self.polling.stop_check());
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        check.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => return Some(ExitReason::Shutdown),
                _ = tokio::time::sleep_until(deadline) => return None,
                _ = check.tick() => {
                    if let Some(reason) = self.poll_signal(identity).exit_reason() {
                        return Some(reason);
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str, DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|err| DaemonError::Runtime(format!("SIGTERM handler failed: {err}")))?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result
            .map(|()| "ctrl-c")
            .map_err(|err| DaemonError::Runtime(format!("ctrl-c handler failed: {err}"))),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str, DaemonError> {
    tokio::signal::ctrl_c()
        .await
        .map(|()| "ctrl-c")
        .map_err(|err| DaemonError::Runtime(format!("ctrl-c handler failed: {err}")))
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    for dir in [paths::state_dir(home), paths::logs_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!("{task} task join failure: {err}"))),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(ENV_LOG_FORMAT)
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}
