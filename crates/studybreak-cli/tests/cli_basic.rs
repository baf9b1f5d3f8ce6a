//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_studybreak"))
        .args(args)
        .env("STUDYBREAK_HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_status_on_first_run() {
    let home = TempDir::new().unwrap();
    let out = run_json(home.path(), &["timer", "status"]);
    let snap = &out["snapshot"];
    assert_eq!(snap["phase"], "study");
    assert_eq!(snap["label"], "Study");
    assert_eq!(snap["remaining_ms"], 1_500_000);
    assert_eq!(snap["is_running"], false);
    assert_eq!(snap["session_count"], 0);
    assert!(out["event"].is_null());
    assert!(home.path().join("studybreak.db").exists());
}

#[test]
fn test_toggle_survives_process_exit() {
    let home = TempDir::new().unwrap();
    let out = run_json(home.path(), &["timer", "toggle"]);
    assert_eq!(out["event"]["type"], "timer_started");

    let out = run_json(home.path(), &["timer", "status"]);
    assert_eq!(out["snapshot"]["is_running"], true);
    assert!(out["snapshot"]["ends_at"].is_string());

    let out = run_json(home.path(), &["timer", "toggle"]);
    assert_eq!(out["event"]["type"], "timer_paused");
    assert_eq!(out["snapshot"]["is_running"], false);
}

#[test]
fn test_skip_and_reset() {
    let home = TempDir::new().unwrap();
    let out = run_json(home.path(), &["timer", "skip"]);
    assert_eq!(out["snapshot"]["phase"], "short_break");
    assert_eq!(out["snapshot"]["session_count"], 1);
    assert_eq!(out["snapshot"]["remaining_ms"], 300_000);

    let out = run_json(home.path(), &["timer", "reset"]);
    assert_eq!(out["event"]["type"], "timer_reset");
    assert_eq!(out["snapshot"]["phase"], "study");
    assert_eq!(out["snapshot"]["session_count"], 0);
}

#[test]
fn test_settings_duration_resets_timer() {
    let home = TempDir::new().unwrap();
    let settings = run_json(home.path(), &["settings", "duration", "study", "40"]);
    assert_eq!(settings["study_duration_min"], 40);

    let out = run_json(home.path(), &["timer", "status"]);
    assert_eq!(out["snapshot"]["remaining_ms"], 40 * 60 * 1000);
}

#[test]
fn test_settings_long_breaks_and_volume() {
    let home = TempDir::new().unwrap();
    let settings = run_json(home.path(), &["settings", "long-breaks", "on"]);
    assert_eq!(settings["use_long_breaks"], true);

    let settings = run_json(home.path(), &["settings", "volume", "0.25"]);
    assert_eq!(settings["alarm_volume"], 0.25);

    let (_, stderr, code) = run_cli(home.path(), &["settings", "volume", "3"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "set", "timer.catch_up", "fast_forward"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "timer.catch_up"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "fast_forward");

    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "timer.nope", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Unknown configuration key"));
}

#[test]
fn test_watch_paused_until_complete_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["timer", "watch", "--until-complete"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("paused"));
}
