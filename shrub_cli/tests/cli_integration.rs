use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Minimal config keeping every file the binary writes inside `dir`.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let state = dir.path().join("state.csv");
    let toml = format!(
        r#"
[hydro]
pump_power = 30

[runner]
tick_ms = 10
# keep status lines out of short runs
status_every_secs = 0

[persistence]
state_file = '{}'
"#,
        state.display()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["table"], 0, "drain-1", "stdout")]
#[case(&["table"], 0, "cycle: 00:50:00", "stdout")]
#[case(&["run", "--max-ticks", "200", "--accelerate", "1000"], 0, "stopped after 200 ticks", "stdout")]
#[case(&["run", "--accelerate", "0.5", "--max-ticks", "1"], 1, "--accelerate must be", "stderr")]
#[case(&["self-check"], 0, "self-check OK", "stdout")]
#[case(&["calibrate-ph"], 2, "required", "stderr")]
#[case(&["calibrate-ph", "--mv", "1510"], 1, "no calibration file", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("shrub_cli").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn run_saves_cycle_state_on_exit() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--max-ticks", "200", "--accelerate", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("phase 1 with 118 s left"));

    let state = fs::read_to_string(dir.path().join("state.csv")).unwrap();
    let mut lines = state.lines();
    assert_eq!(lines.next(), Some("phase_index,remaining_secs"));
    let row = lines.next().unwrap();
    let (phase, remaining) = row.split_once(',').unwrap();
    assert_eq!(phase, "0");
    let remaining: f64 = remaining.parse().unwrap();
    assert!((remaining - 118.0).abs() < 0.05, "remaining {remaining}");
}

#[rstest]
fn run_resumes_from_saved_state() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    fs::write(
        dir.path().join("state.csv"),
        "phase_index,remaining_secs\n3,5\n",
    )
    .unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--max-ticks", "100", "--accelerate", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("phase 4 with 4 s left"));
}

#[rstest]
fn corrupt_state_starts_a_fresh_cycle() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    fs::write(dir.path().join("state.csv"), "phase,left\n3,5\n").unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--max-ticks", "10", "--accelerate", "1000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("phase 1 with"));
}

#[rstest]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[hydro]\npump_power = 150\n").unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("table")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("hydro.pump_power"));
}

#[rstest]
fn settings_file_is_created_then_honoured() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let settings = dir.path().join("settings.csv");

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--settings")
        .arg(&settings)
        .arg("table")
        .assert()
        .success();
    let created = fs::read_to_string(&settings).unwrap();
    assert!(created.contains("Flood Timer,1140"));
    assert!(created.contains("Gap from top,16"));

    fs::write(
        &settings,
        "Flood Timer,600\nActive Pump Timer,60\nDrain Timer,360\n",
    )
    .unwrap();
    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--settings")
        .arg(&settings)
        .arg("table")
        .assert()
        .success()
        .stdout(predicate::str::contains("00:09:00"))
        .stdout(predicate::str::contains("cycle: 00:32:00"));
}

#[rstest]
fn bad_settings_row_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let settings = dir.path().join("settings.csv");
    fs::write(&settings, "Flood Timer,soon\n").unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--settings")
        .arg(&settings)
        .arg("table")
        .assert()
        .failure()
        .stderr(predicate::str::contains("settings file could not be used"))
        .stderr(predicate::str::contains("is not a number"));
}

#[rstest]
fn calibration_round_trips_through_the_file() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("probes.csv");

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .args(["calibrate-ph", "--mv", "1510"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pH 7.00 buffer recorded at 1510.0 mV"));

    // The second buffer keeps the first one.
    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .args(["calibrate-ph", "--mv", "2000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pH 4.00"));

    let text = fs::read_to_string(&cal).unwrap();
    assert!(text.starts_with("name,value"));
    assert!(text.contains("ph_neutral_mv,1510"));
    assert!(text.contains("ph_acid_mv,2000"));
}

#[rstest]
#[case(&["calibrate-ph", "--mv", "1000"])]
#[case(&["calibrate-ph", "--mv", "0"])]
#[case(&["calibrate-ec", "--mv", "5000"])]
fn rejected_buffers_exit_with_calibration_code(#[case] args: &[&str]) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("probes.csv");

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .args(args)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("What happened"));
    assert!(!cal.exists());
}

#[rstest]
fn calibrate_ec_reports_cell_constant() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("probes.csv");

    // 1.413 mS/cm at 25 °C with K = 1 reads 231.732 mV.
    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .args(["calibrate-ec", "--mv", "231.732", "--temp-c", "25"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EC 1.413 mS/cm"))
        .stdout(predicate::str::contains("K = 1.000"));
}

#[rstest]
fn bad_calibration_header_is_reported() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("probes.csv");
    fs::write(&cal, "key,val\nph_neutral_mv,1500\n").unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .arg("table")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid CSV headers"));
}

#[rstest]
fn calibrate_reset_restores_factory_values() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let cal = dir.path().join("probes.csv");

    for args in [
        &["calibrate-ph", "--mv", "1510"][..],
        &["calibrate-ec", "--mv", "231.732", "--temp-c", "30"][..],
    ] {
        Command::cargo_bin("shrub_cli")
            .unwrap()
            .arg("--config")
            .arg(&cfg)
            .arg("--calibration")
            .arg(&cal)
            .args(args)
            .assert()
            .success();
    }

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .args(["calibrate-reset", "--probe", "ph"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pH calibration reset: neutral 1500.00 mV"))
        .stdout(predicate::str::contains("EC calibration reset").not());

    let stored = read_calibration(&cal);
    assert_eq!(stored["ph_neutral_mv"], 1500.0);
    assert_eq!(stored["ph_acid_mv"], 2032.44);
    assert!((stored["ec_k_low"] - 1.0).abs() > 0.05, "EC calibration kept");

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&cal)
        .arg("calibrate-reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("K low 1.000, K high 1.000"));
    let stored = read_calibration(&cal);
    assert_eq!(stored["ec_k_low"], 1.0);
    assert_eq!(stored["ec_k_high"], 1.0);
}

fn read_calibration(path: &std::path::Path) -> std::collections::HashMap<String, f64> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(|line| {
            let (name, value) = line.split_once(',').unwrap();
            (name.to_string(), value.parse().unwrap())
        })
        .collect()
}

#[rstest]
fn out_of_range_settings_are_clamped_at_startup() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let settings = dir.path().join("settings.csv");
    fs::write(&settings, "Flood Timer,1e30\nGap from top,500\n").unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--settings")
        .arg(&settings)
        .arg("table")
        .assert()
        .success()
        // one week of flood minus the 120 s fill
        .stdout(predicate::str::contains("167:58:00"))
        .stderr(predicate::str::contains("operator setting clamped"));
}

#[rstest]
fn week_long_toml_durations_are_rejected() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, "[hydro]\nflood_secs = 1e30\nactive_pump_secs = 1e30\n").unwrap();

    Command::cargo_bin("shrub_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("table")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("hydro.flood_secs"));
}
