use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = format!(
        r#"
[runner]
tick_ms = 10
status_every_secs = 1

[persistence]
state_file = '{}'
"#,
        dir.path().join("state.csv").display()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON: {l}: {e}")))
        .collect()
}

/// Every stdout line of a JSON run is an object; status lines come first and
/// the stop summary last.
#[rstest]
fn jsonl_run_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--max-ticks", "350", "--accelerate", "1000"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    assert!(lines.len() >= 4, "expected status lines and a summary");

    let (summary, statuses) = lines.split_last().unwrap();
    assert_eq!(summary["event"], "stopped");
    assert_eq!(summary["ticks"], 350);
    assert_eq!(summary["phase_index"], 0);
    assert!(summary["remaining_secs"].as_f64().unwrap() > 116.0);
    assert!(summary["saves"].as_u64().unwrap() >= 1);

    for s in statuses {
        for key in ["phase_index", "remaining_secs", "height_cm", "ph", "ec", "temp_c"] {
            assert!(s.get(key).is_some(), "missing {key} in {s}");
        }
        assert!(s["faults"].as_array().unwrap().is_empty());
        assert!(!s["lines"].as_array().unwrap().is_empty());
    }
}

#[rstest]
fn jsonl_table_schema() {
    let out = Command::cargo_bin("shrub_cli")
        .unwrap()
        .args(["--json", "table"])
        .output()
        .unwrap();
    assert!(out.status.success());

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let rows = lines[0].as_array().unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0]["stage"], "fill");
    assert_eq!(rows[0]["pump"], true);
    assert_eq!(rows[0]["secs"], 120.0);
    assert_eq!(rows[1]["secs"], 1020.0);
    assert_eq!(rows[2]["top_valve"], true);
    // Sub-cycle B drains through the bottom valve first.
    assert_eq!(rows[7]["stage"], "drain-1");
    assert_eq!(rows[7]["sub_cycle"], "B");
    assert_eq!(rows[7]["bottom_valve"], true);
    assert_eq!(rows[7]["top_valve"], false);
}

#[rstest]
fn jsonl_error_schema() {
    let dir = tempdir().unwrap();
    let cal = dir.path().join("probes.csv");

    let out = Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--json")
        .arg("--calibration")
        .arg(&cal)
        .args(["calibrate-ph", "--mv", "1000"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));

    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    let err = &lines[0];
    assert_eq!(err["reason"], "OutOfRange");
    assert_eq!(err["details"]["reading"], 1000.0);
    assert!(err["message"].as_str().unwrap().contains("What happened"));
}

/// UI events typed on stdin reach both state machines.
#[rstest]
fn stdin_events_are_dispatched() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let out = assert_cmd::Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("warn")
        .arg("--config")
        .arg(&cfg)
        .args([
            "run",
            "--max-ticks",
            "5000",
            "--accelerate",
            "100",
            "--stdin-events",
        ])
        .write_stdin("USER_TOGGLE\nNOT_AN_EVENT\n")
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let lines = json_lines(&out.stdout);
    let summary = lines.last().unwrap();
    assert!(summary["dispatched"].as_u64().unwrap() >= 2);
    let paused = lines
        .iter()
        .filter_map(|l| l["lines"].as_array())
        .flatten()
        .any(|l| l.as_str().unwrap_or("").contains("PAUSED (user)"));
    assert!(paused, "no paused status line");
}
