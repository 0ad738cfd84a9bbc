use std::fs;
use std::io::Write;
use std::net::UdpSocket;
use std::path::Path;
use std::process::Command;
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;

use auditrelay_core::{
    paths, Checkpoint, ControlState, FileCheckpointStore, FileControlStore, RunIdentity,
};
use tempfile::TempDir;

fn auditrelay_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("auditrelay"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("AUDITRELAY_SYSLOG_HOST")
        .env_remove("AUDITRELAY_JOURNAL")
        .env_remove("AUDITRELAY_ENTRY_TYPES");
    cmd
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if done() {
            return;
        }
        sleep(Duration::from_millis(50));
    }
    panic!("timed out waiting for {what}");
}

/// Asks a launched daemon to stop if a test bails out early.
struct StopOnDrop<'a>(&'a Path);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        let control = FileControlStore::at(self.0);
        if matches!(control.read(), Ok(Some(ControlState::Running(_)))) {
            let _ = control.write(&ControlState::Stopping);
        }
    }
}

fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().expect("spawn true");
    let pid = child.id();
    child.wait().expect("reap");
    pid
}

#[test]
fn status_on_fresh_home_reports_stopped() {
    let home = TempDir::new().expect("home");
    auditrelay_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("audit relay is stopped"));
}

#[test]
fn stop_when_not_running_is_a_no_op() {
    let home = TempDir::new().expect("home");
    auditrelay_cmd(home.path())
        .arg("STOP")
        .assert()
        .success()
        .stdout(contains("not running"));
    assert!(!paths::control_path(home.path()).exists());
}

#[test]
fn status_json_carries_state_tag() {
    let home = TempDir::new().expect("home");
    auditrelay_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""state": "stopped""#));
}

#[test]
fn status_resets_record_naming_a_dead_run() {
    let home = TempDir::new().expect("home");
    let stale = RunIdentity::new(dead_pid(), "secadm", "AUDITRELAY");
    FileControlStore::at(home.path())
        .write(&ControlState::Running(stale))
        .expect("seed control record");

    auditrelay_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("not active; state reset to stopped"));

    assert_eq!(
        FileControlStore::at(home.path()).read().expect("read"),
        Some(ControlState::Stopped)
    );
    auditrelay_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("audit relay is stopped"));
}

#[cfg(unix)]
#[test]
fn start_forwards_journal_and_stop_ends_the_daemon() {
    let home = TempDir::new().expect("home");
    let collector = UdpSocket::bind("127.0.0.1:0").expect("collector");
    collector
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("timeout");
    let port = collector.local_addr().expect("addr").port().to_string();

    let journal = paths::default_journal_path(home.path());
    fs::create_dir_all(journal.parent().expect("relay root")).expect("relay root");
    let mut file = fs::File::create(&journal).expect("journal");
    for seq in 1..=3 {
        writeln!(
            file,
            r#"{{"sequence":{seq},"entry_type":"PW","syslog_event":"<86>1 - ibmi QAUDJRN - PW - entry {seq}"}}"#
        )
        .expect("write entry");
    }
    drop(file);

    let cmd = |action: &str| {
        let mut cmd = auditrelay_cmd(home.path());
        cmd.arg(action)
            .env("AUDITRELAY_SYSLOG_PORT", &port)
            .env("AUDITRELAY_POLL_INTERVAL_SECS", "3600")
            .env("AUDITRELAY_STOP_CHECK_MS", "50");
        cmd
    };

    cmd("START").assert().success().stdout(contains("submitted as job"));
    let _guard = StopOnDrop(home.path());
    cmd("start").assert().success().stdout(contains("already running"));

    let checkpoints = FileCheckpointStore::at(home.path());
    wait_until("checkpoint 3", || {
        matches!(checkpoints.read(), Ok(Some(Checkpoint(3))))
    });
    assert_eq!(
        fs::read_to_string(checkpoints.path()).expect("checkpoint record"),
        "00000000000000000003"
    );

    let mut buf = [0u8; 1024];
    let mut received = Vec::new();
    while let Ok(n) = collector.recv(&mut buf) {
        received.push(String::from_utf8_lossy(&buf[..n]).into_owned());
    }
    assert_eq!(received.len(), 3, "{received:?}");
    assert!(received[2].ends_with("entry 3"));

    cmd("status")
        .assert()
        .success()
        .stdout(contains("running as job"))
        .stdout(contains("at checkpoint 3"));

    cmd("stop").assert().success().stdout(contains("stop requested"));

    let control = FileControlStore::at(home.path());
    wait_until("daemon to record stopped", || {
        matches!(control.read(), Ok(Some(ControlState::Stopped)))
    });
    cmd("status")
        .assert()
        .success()
        .stdout(contains("audit relay is stopped"));
    assert!(paths::stdout_log_path(home.path()).exists());
}
