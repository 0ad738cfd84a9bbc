//! Operator commands: START, STOP and STATUS against the control record.
//!
//! None of these talk to the daemon directly. They read and write the
//! control record; the daemon notices on its next poll.

use std::fmt;

use auditrelay_core::{Checkpoint, CheckpointStore, ControlState, ControlStore, RunIdentity};
use serde::Serialize;

use crate::error::DaemonError;
use crate::process::{Launcher, ProcessRegistry};

/// What a control command observed or did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ControlReport {
    /// START launched a new run.
    Started { run: RunIdentity },
    /// START found a run already recorded and did nothing.
    AlreadyRunning { run: RunIdentity },
    /// STOP wrote the stopping sentinel. `run` is the run it was aimed at, if known.
    StopRequested { run: Option<RunIdentity> },
    /// STOP found nothing to stop.
    NotRunning,
    Stopped,
    Stopping,
    /// The record named a run the host no longer has. The record is now reset.
    Inconsistent { run: RunIdentity },
    Running { run: RunIdentity, checkpoint: Checkpoint },
}

impl fmt::Display for ControlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlReport::Started { run } => write!(f, "audit relay submitted as job {run}"),
            ControlReport::AlreadyRunning { run } => {
                write!(f, "audit relay is already running as job {run}")
            }
            ControlReport::StopRequested { run: Some(run) } => {
                write!(f, "stop requested for job {run}; it ends after its current cycle")
            }
            ControlReport::StopRequested { run: None } => {
                write!(f, "stop requested; the daemon is already winding down")
            }
            ControlReport::NotRunning => write!(f, "audit relay is not running"),
            ControlReport::Stopped => write!(f, "audit relay is stopped"),
            ControlReport::Stopping => write!(f, "audit relay is stopping"),
            ControlReport::Inconsistent { run } => write!(
                f,
                "control record named job {run} but it is not active; state reset to stopped"
            ),
            ControlReport::Running { run, checkpoint } => write!(
                f,
                "audit relay is running as job {run}, at checkpoint {checkpoint}"
            ),
        }
    }
}

/// START. A recorded run short-circuits; `Stopped` and `Stopping` both launch.
/// A pending `Stopping` sentinel is cleared to `Stopped` first; the old run
/// still winds down on its next poll.
///
/// The launch is not awaited: the report means "submitted", not "forwarding".
///
/// # Errors
/// [`DaemonError::Launch`] (or I/O preparing the log files) from `launcher`.
/// No run identity is recorded in that case.
pub fn start(
    control: &dyn ControlStore,
    launcher: &dyn Launcher,
) -> Result<ControlReport, DaemonError> {
    match control.get() {
        ControlState::Running(run) => {
            tracing::info!(run = %run, "start ignored, already running");
            return Ok(ControlReport::AlreadyRunning { run });
        }
        // A sentinel left for the old run would stop the new one at its claim.
        ControlState::Stopping => control.set(&ControlState::Stopped),
        ControlState::Stopped => {}
    }

    let run = launcher.launch()?;
    control.set(&ControlState::Running(run.clone()));
    tracing::info!(run = %run, "daemon launched");
    Ok(ControlReport::Started { run })
}

/// STOP. Writes the stopping sentinel unless the record already says stopped.
pub fn stop(control: &dyn ControlStore) -> ControlReport {
    let run = match control.get() {
        ControlState::Stopped => return ControlReport::NotRunning,
        ControlState::Running(run) => Some(run),
        ControlState::Stopping => None,
    };
    control.set(&ControlState::Stopping);
    tracing::info!("stop requested");
    ControlReport::StopRequested { run }
}

/// STATUS. A recorded run the registry can't confirm is reported once as
/// [`ControlReport::Inconsistent`] and the record is reset to `Stopped`.
pub fn status(
    control: &dyn ControlStore,
    checkpoints: &dyn CheckpointStore,
    registry: &dyn ProcessRegistry,
) -> ControlReport {
    match control.get() {
        ControlState::Stopped => ControlReport::Stopped,
        ControlState::Stopping => ControlReport::Stopping,
        ControlState::Running(run) if registry.is_alive(&run) => ControlReport::Running {
            checkpoint: checkpoints.load(),
            run,
        },
        ControlState::Running(run) => {
            tracing::warn!(run = %run, "recorded run is not active, resetting control state");
            control.set(&ControlState::Stopped);
            ControlReport::Inconsistent { run }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[derive(Default)]
    struct MemoryControl {
        state: RefCell<ControlState>,
        writes: Cell<usize>,
        history: RefCell<Vec<ControlState>>,
    }

    impl MemoryControl {
        fn with(state: ControlState) -> Self {
            let control = Self::default();
            *control.state.borrow_mut() = state;
            control
        }
    }

    impl ControlStore for MemoryControl {
        fn get(&self) -> ControlState {
            self.state.borrow().clone()
        }

        fn set(&self, state: &ControlState) {
            *self.state.borrow_mut() = state.clone();
            self.writes.set(self.writes.get() + 1);
            self.history.borrow_mut().push(state.clone());
        }
    }

    struct FixedCheckpoint(u64);

    impl CheckpointStore for FixedCheckpoint {
        fn load(&self) -> Checkpoint {
            Checkpoint(self.0)
        }

        fn save(&self, _checkpoint: Checkpoint) {}
    }

    struct FakeLauncher {
        next_pid: Cell<u32>,
        launches: Cell<usize>,
        fail: bool,
    }

    impl FakeLauncher {
        fn new() -> Self {
            Self {
                next_pid: Cell::new(4100),
                launches: Cell::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    impl Launcher for FakeLauncher {
        fn launch(&self) -> Result<RunIdentity, DaemonError> {
            if self.fail {
                return Err(DaemonError::Launch("exec format error".to_string()));
            }
            self.launches.set(self.launches.get() + 1);
            let pid = self.next_pid.get();
            self.next_pid.set(pid + 1);
            Ok(RunIdentity::new(pid, "secadm", "AUDITRELAY"))
        }
    }

    struct Registry(bool);

    impl ProcessRegistry for Registry {
        fn is_alive(&self, _run: &RunIdentity) -> bool {
            self.0
        }
    }

    fn run(pid: u32) -> RunIdentity {
        RunIdentity::new(pid, "secadm", "AUDITRELAY")
    }

    #[test]
    fn start_from_stopped_launches_and_records_run() {
        let control = MemoryControl::default();
        let launcher = FakeLauncher::new();

        let report = start(&control, &launcher).expect("start");

        assert_eq!(report, ControlReport::Started { run: run(4100) });
        assert_eq!(control.get(), ControlState::Running(run(4100)));
    }

    #[test]
    fn second_start_reports_already_running() {
        let control = MemoryControl::default();
        let launcher = FakeLauncher::new();

        start(&control, &launcher).expect("first");
        let second = start(&control, &launcher).expect("second");

        assert_eq!(second, ControlReport::AlreadyRunning { run: run(4100) });
        assert_eq!(launcher.launches.get(), 1);
        assert_eq!(control.get(), ControlState::Running(run(4100)));
    }

    #[test]
    fn start_while_stopping_launches_a_new_run() {
        let control = MemoryControl::with(ControlState::Stopping);
        let launcher = FakeLauncher::new();

        let report = start(&control, &launcher).expect("start");

        assert!(matches!(report, ControlReport::Started { .. }));
        assert_eq!(launcher.launches.get(), 1);
        assert_eq!(
            *control.history.borrow(),
            vec![ControlState::Stopped, ControlState::Running(run(4100))],
            "stale sentinel cleared before the new run is recorded"
        );
    }

    #[test]
    fn stop_right_after_start_stays_pending_for_the_new_run() {
        let control = MemoryControl::default();
        start(&control, &FakeLauncher::new()).expect("start");

        stop(&control);

        assert_eq!(control.get(), ControlState::Stopping);
    }

    #[test]
    fn failed_launch_leaves_record_alone() {
        let control = MemoryControl::default();
        let err = start(&control, &FakeLauncher::failing()).unwrap_err();

        assert!(matches!(err, DaemonError::Launch(_)));
        assert_eq!(control.get(), ControlState::Stopped);
        assert_eq!(control.writes.get(), 0);
    }

    #[test]
    fn stop_when_stopped_is_a_no_op() {
        let control = MemoryControl::default();

        assert_eq!(stop(&control), ControlReport::NotRunning);
        assert_eq!(control.writes.get(), 0);
    }

    #[test]
    fn stop_writes_sentinel_for_running_daemon() {
        let control = MemoryControl::with(ControlState::Running(run(77)));

        let report = stop(&control);

        assert_eq!(report, ControlReport::StopRequested { run: Some(run(77)) });
        assert_eq!(control.get(), ControlState::Stopping);
    }

    #[test]
    fn stop_while_stopping_rewrites_sentinel() {
        let control = MemoryControl::with(ControlState::Stopping);
        assert_eq!(stop(&control), ControlReport::StopRequested { run: None });
        assert_eq!(control.get(), ControlState::Stopping);
    }

    #[test]
    fn status_reports_running_with_checkpoint() {
        let control = MemoryControl::with(ControlState::Running(run(77)));

        let report = status(&control, &FixedCheckpoint(1234), &Registry(true));

        assert_eq!(
            report,
            ControlReport::Running {
                run: run(77),
                checkpoint: Checkpoint(1234)
            }
        );
        assert_eq!(control.writes.get(), 0);
    }

    #[test]
    fn status_reconciles_dead_run_to_stopped() {
        let control = MemoryControl::with(ControlState::Running(run(77)));

        let first = status(&control, &FixedCheckpoint(0), &Registry(false));
        let second = status(&control, &FixedCheckpoint(0), &Registry(false));

        assert_eq!(first, ControlReport::Inconsistent { run: run(77) });
        assert_eq!(second, ControlReport::Stopped);
        assert_eq!(control.get(), ControlState::Stopped);
    }

    #[test]
    fn status_reports_stopping_without_probing() {
        let control = MemoryControl::with(ControlState::Stopping);
        assert_eq!(
            status(&control, &FixedCheckpoint(0), &Registry(false)),
            ControlReport::Stopping
        );
        assert_eq!(control.get(), ControlState::Stopping);
    }

    #[test]
    fn reports_serialize_with_state_tag() {
        let report = ControlReport::Running {
            run: run(77),
            checkpoint: Checkpoint(9),
        };
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["state"], "running");
        assert_eq!(json["checkpoint"], 9);
        assert_eq!(json["run"]["job_number"], 77);

        let json = serde_json::to_value(ControlReport::NotRunning).expect("json");
        assert_eq!(json["state"], "not_running");
    }

    #[test]
    fn display_names_the_job() {
        let text = ControlReport::Running {
            run: run(77),
            checkpoint: Checkpoint(9),
        }
        .to_string();
        assert!(text.contains("77/secadm/AUDITRELAY"));
        assert!(text.contains("checkpoint 9"));
    }
}
