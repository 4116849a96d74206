// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end tests for the `penguin` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn penguin(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("penguin").unwrap();
    cmd.env_remove("RUST_LOG").arg("--config-dir").arg(config);
    cmd
}

fn write_script(dir: &TempDir, name: &str, script: &Value) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(script).unwrap()).unwrap();
    path
}

/// `main` schedules a promise reaction and a zero-delay timer.
fn promise_vs_timeout() -> Value {
    json!([
        {
            "type": "push-function",
            "task": {
                "name": "main",
                "schedules": [
                    { "kind": "microtask", "task": { "name": "then1", "source": "promise" } },
                    { "kind": "macrotask", "task": { "name": "timeout", "source": "timer" }, "delay": 0 }
                ]
            }
        },
        { "type": "start" }
    ])
}

fn run_json(dir: &TempDir, script: &Path, extra: &[&str]) -> Value {
    let output = penguin(&dir.path().join("config"))
        .arg("run")
        .arg(script)
        .args(["--format", "json", "--interval-ms", "20"])
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn run_drives_script_to_completion() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "script.json", &promise_vs_timeout());
    let report = run_json(&dir, &script, &[]);

    assert_eq!(report["run"]["outcome"], "completed");
    assert_eq!(report["run"]["ticks"], 8);
    assert_eq!(report["final"]["phase"], "completed");
    assert_eq!(report["final"]["executed"], 3);
    assert_eq!(report["errors"], 0);
    // Tick 0 plus one entry per committed tick.
    assert_eq!(report["history"].as_array().unwrap().len(), 9);
    assert_eq!(report["history"][1]["call_stack"], json!(["main"]));
}

#[test]
fn breakpoint_ends_the_run_at_its_tick() {
    let dir = TempDir::new().unwrap();
    let mut script = promise_vs_timeout();
    script
        .as_array_mut()
        .unwrap()
        .insert(0, json!({ "type": "set-breakpoint", "tick": 3 }));
    let script = write_script(&dir, "script.json", &script);
    let report = run_json(&dir, &script, &[]);

    assert_eq!(report["run"]["outcome"], "stopped");
    assert_eq!(report["run"]["ticks"], 3);
    assert_eq!(report["final"]["tick"], 3);
}

#[test]
fn max_ticks_caps_the_run() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "script.json", &promise_vs_timeout());
    let report = run_json(&dir, &script, &["--max-ticks", "2"]);

    assert_eq!(report["run"]["ticks"], 2);
    assert_eq!(report["final"]["phase"], "microtask-drain");
}

#[test]
fn max_ticks_counts_from_where_the_run_starts() {
    let dir = TempDir::new().unwrap();
    let mut steps = promise_vs_timeout();
    let list = steps.as_array_mut().unwrap();
    list.insert(1, json!({ "type": "tick" }));
    list.insert(1, json!({ "type": "tick" }));
    let script = write_script(&dir, "script.json", &steps);
    let report = run_json(&dir, &script, &["--max-ticks", "2"]);

    assert_eq!(report["run"]["ticks"], 2);
    assert_eq!(report["final"]["tick"], 4);
}

#[test]
fn script_without_start_is_not_driven() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        "script.json",
        &json!([
            { "type": "push-function", "task": { "name": "main" } },
            { "type": "tick" },
            { "type": "pop-function" }
        ]),
    );
    let report = run_json(&dir, &script, &[]);

    assert!(report["run"].is_null());
    assert_eq!(report["commands"].as_array().unwrap().len(), 3);
    assert_eq!(report["final"]["tick"], 1);
    assert_eq!(report["final"]["executed"], 1);
}

#[test]
fn strict_fails_on_rejected_commands() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "script.json", &json!([{ "type": "pop-function" }]));
    let config = dir.path().join("config");

    penguin(&config)
        .arg("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("invalid-state"));

    penguin(&config)
        .arg("run")
        .arg(&script)
        .arg("--strict")
        .assert()
        .failure();
}

#[test]
fn table_output_lists_history_and_final_state() {
    let dir = TempDir::new().unwrap();
    let script = write_script(&dir, "script.json", &promise_vs_timeout());

    penguin(&dir.path().join("config"))
        .arg("run")
        .arg(&script)
        .args(["--interval-ms", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("macrotask-pick"))
        .stdout(predicate::str::contains("run: 8 ticks, completed"))
        .stdout(predicate::str::contains("final: tick 8 phase completed"));
}

#[test]
fn validate_reports_bad_commands() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config");
    let bad = write_script(
        &dir,
        "bad.json",
        &json!([
            { "type": "tick" },
            { "type": "push-function", "task": { "name": "   " } }
        ]),
    );
    penguin(&config)
        .arg("validate")
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("#1 push-function"));

    let good = write_script(&dir, "good.json", &promise_vs_timeout());
    penguin(&config)
        .arg("validate")
        .arg(&good)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 2 commands"));
}

#[test]
fn malformed_script_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    penguin(&dir.path().join("config"))
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse scenario"));
}

#[test]
fn prefs_set_show_reset() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config");

    penguin(&config)
        .args(["prefs", "set", "--stack", "7", "--keep-recent", "4", "--interval-ms", "50"])
        .assert()
        .success();

    let output = penguin(&config).args(["prefs", "show"]).output().unwrap();
    assert!(output.status.success());
    let prefs: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(prefs["limits"]["max_call_stack_size"], 7);
    assert_eq!(prefs["tick_interval_ms"], 50);
    assert_eq!(prefs["retention"], json!({ "mode": "keep-recent", "window": 4 }));

    penguin(&config).args(["prefs", "reset"]).assert().success();
    let output = penguin(&config).args(["prefs", "show"]).output().unwrap();
    let prefs: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(prefs["limits"]["max_call_stack_size"], 100);
    assert_eq!(prefs["retention"], json!({ "mode": "keep-all" }));
}

#[test]
fn prefs_set_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    penguin(&dir.path().join("config"))
        .args(["prefs", "set", "--macrotasks", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_macrotask_queue_size"));
}

#[test]
fn saved_limits_apply_to_runs() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config");
    penguin(&config)
        .args(["prefs", "set", "--stack", "1"])
        .assert()
        .success();

    let script = write_script(
        &dir,
        "script.json",
        &json!([
            { "type": "push-function", "task": { "name": "a" } },
            { "type": "push-function", "task": { "name": "b" } }
        ]),
    );
    let output = penguin(&config)
        .arg("run")
        .arg(&script)
        .args(["--format", "json"])
        .output()
        .unwrap();
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["commands"][0]["success"], true);
    assert_eq!(report["commands"][1]["error"], "capacity");
}
