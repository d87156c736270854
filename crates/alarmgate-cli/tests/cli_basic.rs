//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a temporary data directory and
//! verify its JSON output.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_alarmgate"))
        .args(args)
        .env("ALARMGATE_DATA_DIR", data_dir)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Run a CLI command, expect success and parse stdout as JSON.
fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

fn create_alarm(data_dir: &Path, extra: &[&str]) -> String {
    let mut args = vec!["alarm", "create", "06:45"];
    args.extend_from_slice(extra);
    let record = run_json(data_dir, &args);
    record["id"].as_str().expect("alarm id").to_string()
}

#[test]
fn test_alarm_create_and_show() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_alarm(dir.path(), &["--label", "Gym", "--repeat", "weekdays"]);

    let record = run_json(dir.path(), &["alarm", "show", &id]);
    assert_eq!(record["time"]["hour"], 6);
    assert_eq!(record["time"]["minute"], 45);
    assert_eq!(record["label"], "Gym");
    assert_eq!(record["enabled"], true);
    assert_eq!(record["repeat_days"].as_array().unwrap().len(), 5);
}

#[test]
fn test_alarm_create_rejects_bad_time() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["alarm", "create", "25:10"]);
    assert_ne!(code, 0);
    assert!(!stderr.is_empty());

    let list = run_json(dir.path(), &["alarm", "list"]);
    assert!(list.as_array().unwrap().is_empty());
}

#[test]
fn test_alarm_update_disable_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_alarm(dir.path(), &[]);

    let updated = run_json(dir.path(), &["alarm", "update", &id, "--time", "07:15", "--sound", "birds"]);
    assert_eq!(updated["time"]["minute"], 15);
    assert_eq!(updated["sound"], "birds");

    let disabled = run_json(dir.path(), &["alarm", "disable", &id]);
    assert_eq!(disabled["enabled"], false);

    let (stdout, _, code) = run_cli(dir.path(), &["alarm", "delete", &id]);
    assert_eq!(code, 0);
    assert!(stdout.contains("alarm deleted"));

    let (_, stderr, code) = run_cli(dir.path(), &["alarm", "show", &id]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_ring_flow_without_mission() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_alarm(dir.path(), &["--snooze-max", "1"]);

    let event = run_json(dir.path(), &["ring", "fire", &id]);
    assert_eq!(event["type"], "AlarmRinging");

    let status = run_json(dir.path(), &["ring", "status"]);
    assert_eq!(status["active"]["state"], "Ringing");

    let event = run_json(dir.path(), &["ring", "snooze"]);
    assert_eq!(event["type"], "AlarmSnoozed");
    assert_eq!(event["snooze_count"], 1);
    assert_eq!(event["snoozes_remaining"], 0);

    let status = run_json(dir.path(), &["ring", "status"]);
    assert_eq!(status["snoozed"]["snooze_count"], 1);

    // Snooze has not run out yet.
    let (_, _, code) = run_cli(dir.path(), &["ring", "expire"]);
    assert_eq!(code, 1);

    let event = run_json(dir.path(), &["ring", "dismiss"]);
    assert_eq!(event["type"], "AlarmDismissed");

    let status = run_json(dir.path(), &["ring", "status"]);
    assert!(status["active"].is_null());
}

#[test]
fn test_ring_flow_with_qr_mission() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_alarm(dir.path(), &["--mission", "qr", "--payload", "ABC123"]);
    run_json(dir.path(), &["ring", "fire", &id]);

    let (_, stderr, code) = run_cli(dir.path(), &["ring", "dismiss"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Invalid transition"));

    let event = run_json(dir.path(), &["ring", "mission-start"]);
    assert_eq!(event["type"], "MissionStarted");
    assert_eq!(event["mission"], "qr");

    let event = run_json(dir.path(), &["ring", "submit", "qr", "XYZ"]);
    assert_eq!(event["type"], "MissionAttemptFailed");
    assert_eq!(event["result"]["success"], false);

    let event = run_json(dir.path(), &["ring", "submit", "qr", "ABC123"]);
    assert_eq!(event["type"], "AlarmDismissed");
    assert_eq!(event["result"]["success"], true);
}

#[test]
fn test_second_fire_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let id = create_alarm(dir.path(), &[]);
    run_json(dir.path(), &["ring", "fire", &id]);

    let event = run_json(dir.path(), &["ring", "fire", &id]);
    assert_eq!(event["type"], "AlarmAlreadyActive");
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "missions.typing_timeout_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "20");

    let (stdout, _, code) = run_cli(dir.path(), &["config", "set", "defaults.sound", "siren"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let id = create_alarm(dir.path(), &[]);
    let record = run_json(dir.path(), &["alarm", "show", &id]);
    assert_eq!(record["sound"], "siren");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "defaults.volume", "3"]);
    assert_eq!(code, 1);
    let (_, _, code) = run_cli(dir.path(), &["config", "get", "defaults.nope"]);
    assert_eq!(code, 1);
}

#[test]
fn test_run_once_without_due_triggers() {
    let dir = tempfile::tempdir().unwrap();
    create_alarm(dir.path(), &[]);
    let (stdout, stderr, code) = run_cli(dir.path(), &["run", "--once"]);
    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.trim().is_empty());
}
