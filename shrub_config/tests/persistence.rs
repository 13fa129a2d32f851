use std::fs;

use rstest::rstest;
use shrub_config::settings::load_or_create_settings;
use shrub_config::{
    Config, CycleState, ProbeCalibration, UserSettings, load_cycle_state, load_probe_calibration,
    load_settings_csv, save_cycle_state, save_probe_calibration, save_settings_csv,
};
use tempfile::tempdir;

#[test]
fn settings_are_created_on_first_boot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Settings.csv");
    let s = load_or_create_settings(&path, UserSettings::default()).unwrap();
    assert_eq!(s, UserSettings::default());
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().next(), Some("Flood Timer,1140"));
    assert!(text.contains("Gap from top,16"));
}

#[test]
fn saved_settings_reload_and_override_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Settings.csv");
    let wanted = UserSettings {
        flood_secs: 1200.0,
        active_pump_secs: 900.0,
        ph_low: 5.5,
        ..UserSettings::default()
    };
    save_settings_csv(&path, &wanted).unwrap();

    let loaded = load_settings_csv(&path, UserSettings::default()).unwrap();
    assert_eq!(loaded, wanted);

    let mut cfg = Config::default();
    assert!(cfg.apply_settings(&loaded).is_empty());
    assert_eq!(cfg.hydro.flood_secs, 1200.0);
    assert_eq!(cfg.dosing.ph_low, 5.5);
    assert_eq!(cfg.user_settings(), wanted);
}

#[test]
fn partial_settings_keep_base_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Settings.csv");
    fs::write(&path, "  ph high threshold , 8.5\n").unwrap();
    let s = load_settings_csv(&path, UserSettings::default()).unwrap();
    assert_eq!(s.ph_high, 8.5);
    assert_eq!(s.ph_low, UserSettings::default().ph_low);
}

#[rstest]
#[case("Flood Timer,soon\n", "not a number")]
#[case("Lamp Timer,10\n", "unknown label")]
#[case("Flood Timer,10,extra\n", "must be 'label,value'")]
fn bad_settings_rows_are_rejected(#[case] text: &str, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Settings.csv");
    fs::write(&path, text).unwrap();
    let err = load_settings_csv(&path, UserSettings::default()).unwrap_err();
    assert!(format!("{err:#}").contains(needle), "{err:#}");
}

#[test]
fn cycle_state_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.csv");
    assert_eq!(load_cycle_state(&path).unwrap(), None);

    let state = CycleState {
        phase_index: 3,
        remaining_secs: 42.5,
    };
    save_cycle_state(&path, &state).unwrap();
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("phase_index,remaining_secs\n"));
    assert_eq!(load_cycle_state(&path).unwrap(), Some(state));
}

#[test]
fn cycle_state_with_wrong_headers_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.csv");
    fs::write(&path, "index,left\n2,10\n").unwrap();
    let err = load_cycle_state(&path).unwrap_err();
    assert!(format!("{err}").contains("must have headers 'phase_index,remaining_secs'"));
}

#[test]
fn negative_remaining_time_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.csv");
    fs::write(&path, "phase_index,remaining_secs\n1,-4\n").unwrap();
    assert!(load_cycle_state(&path).is_err());
}

#[test]
fn probe_calibration_round_trips_and_applies() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("probes.csv");
    let mut cfg = Config::default();
    let base = ProbeCalibration::from(&cfg.probes);
    let cal = ProbeCalibration {
        ph_neutral_mv: 1480.0,
        ec_k_low: 1.12,
        ..base
    };
    save_probe_calibration(&path, &cal).unwrap();
    let loaded = load_probe_calibration(&path, base).unwrap();
    assert_eq!(loaded, cal);

    loaded.apply_to(&mut cfg.probes);
    assert_eq!(cfg.probes.ph_neutral_mv, 1480.0);
    assert_eq!(cfg.probes.ph_acid_mv, 2032.44);
}
