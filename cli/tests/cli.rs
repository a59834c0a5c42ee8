use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("push").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("sandboxed coding agent"))
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("approve"));
}

#[test]
fn sessions_on_empty_dir_reports_none_found() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cmd = Command::cargo_bin("push").unwrap();
    cmd.env("PUSH_SESSION_DIR", tmp.path());
    cmd.arg("sessions");
    cmd.assert().success().stdout(predicate::str::contains("no sessions found"));
}

#[test]
fn run_without_task_fails_with_usage_error() {
    let mut cmd = Command::cargo_bin("push").unwrap();
    cmd.arg("run");
    cmd.assert().failure();
}
