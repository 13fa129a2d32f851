use std::time::{Duration, Instant};

use rstest::rstest;
use shrub_core::conditioner::check_range;
use shrub_core::mocks::RecordingDose;
use shrub_core::{
    Conditioner, DoseEvent, DoseSettings, DoseState, DoseThresholds, HydroView, RangeCondition,
    Stage,
};
use shrub_traits::DosePump;

const S: Duration = Duration::from_secs(1);

const VIEW: HydroView = HydroView {
    phase_index: 0,
    stage: Stage::Fill,
    paused: false,
};

fn conditioner() -> (RecordingDose, Conditioner<RecordingDose>) {
    let log = RecordingDose::default();
    let mut c = Conditioner::new(log.clone(), DoseSettings::default());
    c.begin();
    (log, c)
}

#[rstest]
#[case(9.5, 1.0, Some(RangeCondition::HighPh))]
#[case(3.0, 1.0, Some(RangeCondition::LowPh))]
#[case(7.0, 0.0, Some(RangeCondition::LowEc))]
#[case(3.0, 0.0, Some(RangeCondition::LowPh))]
#[case(9.5, 0.0, Some(RangeCondition::HighPh))]
#[case(7.0, 1.0, None)]
#[case(7.0, 5.0, None)]
fn range_check_priority(#[case] ph: f64, #[case] ec: f64, #[case] want: Option<RangeCondition>) {
    assert_eq!(check_range(ph, ec, &DoseThresholds::default()), want);
}

#[test]
fn low_ph_then_low_ec_within_settle_runs_one_pump() {
    let t0 = Instant::now();
    let (log, mut c) = conditioner();

    c.tick(t0, Some((3.0, 1.0)), VIEW);
    assert_eq!(c.running(), Some(DosePump::Acid));

    for s in 1..120 {
        c.tick(t0 + S * s, Some((7.0, 0.0)), VIEW);
        assert!(log.state().on_count() <= 1);
    }
    assert_eq!(log.state().activations, vec![DosePump::Acid]);
    assert_eq!(log.state().peak_on, 1);
    assert_eq!(c.state(t0 + S * 120), DoseState::Settling);
}

#[test]
fn dose_pulse_stops_after_dose_duration() {
    let t0 = Instant::now();
    let (log, mut c) = conditioner();
    c.tick(t0, Some((9.5, 1.0)), VIEW);
    assert!(log.state().is_on(DosePump::Base));

    let fired = c.tick(t0 + S, None, VIEW);
    assert_eq!(fired, vec![DoseEvent::OnTimer]);
    assert_eq!(log.state().on_count(), 0);
}

#[test]
fn doses_again_once_settled() {
    let t0 = Instant::now();
    let (log, mut c) = conditioner();
    c.tick(t0, Some((7.0, 0.0)), VIEW);
    c.tick(t0 + S, None, VIEW);
    c.tick(t0 + S * 299, Some((7.0, 0.0)), VIEW);
    assert_eq!(log.state().activations.len(), 1);

    c.tick(t0 + S * 300, Some((7.0, 0.0)), VIEW);
    assert_eq!(
        log.state().activations,
        vec![DosePump::Nutrient, DosePump::Nutrient]
    );
}

#[test]
fn overflow_aborts_dose_and_blocks_new_ones() {
    let t0 = Instant::now();
    let (log, mut c) = conditioner();
    c.tick(t0, Some((3.0, 1.0)), VIEW);
    c.handle(DoseEvent::Overflow, t0);
    assert_eq!(log.state().on_count(), 0);
    assert_eq!(c.state(t0), DoseState::Paused);

    c.tick(t0 + S * 400, Some((3.0, 1.0)), VIEW);
    assert_eq!(log.state().activations.len(), 1);

    c.handle(DoseEvent::NoOverflow, t0 + S * 400);
    c.tick(t0 + S * 400, Some((3.0, 1.0)), VIEW);
    assert_eq!(log.state().activations.len(), 2);
}

#[test]
fn user_override_survives_overflow_recovery() {
    let t0 = Instant::now();
    let (_log, mut c) = conditioner();
    c.handle(DoseEvent::Overflow, t0);
    c.handle(DoseEvent::UserToggle, t0);
    c.handle(DoseEvent::NoOverflow, t0);
    assert!(c.safety().is_paused());
    assert!(!c.can_dose(t0));
}

#[test]
fn test_runs_all_pumps_then_turns_them_off() {
    let t0 = Instant::now();
    let (log, mut c) = conditioner();
    c.handle(DoseEvent::Test, t0);
    assert_eq!(log.state().on_count(), 3);
    assert_eq!(c.state(t0), DoseState::Testing);
    // No range dosing during the test.
    c.tick(t0 + S, Some((3.0, 1.0)), VIEW);
    assert_eq!(log.state().on_count(), 3);

    let fired = c.tick(t0 + S * 6, None, VIEW);
    assert!(fired.contains(&DoseEvent::TestDone));
    assert_eq!(log.state().on_count(), 0);
}

#[test]
fn test_is_ignored_while_paused() {
    let t0 = Instant::now();
    let (log, mut c) = conditioner();
    c.handle(DoseEvent::UserToggle, t0);
    c.handle(DoseEvent::Test, t0);
    assert_eq!(log.state().on_count(), 0);
    assert!(!c.is_testing());
}

#[test]
fn settings_update_clamps_and_keeps_settle_progress() {
    let t0 = Instant::now();
    let (_log, mut c) = conditioner();
    c.tick(t0, Some((7.0, 0.0)), VIEW);
    c.update_settings(DoseSettings {
        thresholds: DoseThresholds {
            ph_high: 20.0,
            ph_low: -1.0,
            ..DoseThresholds::default()
        },
        settle_duration: S * 600,
        ..DoseSettings::default()
    });
    assert_eq!(c.thresholds().ph_high, 14.0);
    assert_eq!(c.thresholds().ph_low, 0.0);
    assert_eq!(c.settle_remaining(t0 + S * 100), Some(S * 500));
}

#[test]
fn inverted_ph_thresholds_are_swapped() {
    let c = Conditioner::new(
        RecordingDose::default(),
        DoseSettings {
            thresholds: DoseThresholds {
                ph_high: 5.0,
                ph_low: 8.0,
                ..DoseThresholds::default()
            },
            ..DoseSettings::default()
        },
    );
    assert_eq!(c.thresholds().ph_low, 5.0);
    assert_eq!(c.thresholds().ph_high, 8.0);
}
