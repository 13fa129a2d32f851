use std::time::{Duration, Instant};

use proptest::prelude::*;
use shrub_core::level::{OverflowLatch, water_height};
use shrub_core::{HydroSettings, LowPassFilter, PhaseTable, SafetyFlags, Timer};

proptest! {
    #[test]
    fn water_height_is_clamped_and_monotone(a in -50.0f64..200.0, b in -50.0f64..200.0) {
        let hole = 88.9;
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        let h_near = water_height(near, hole);
        let h_far = water_height(far, hole);
        prop_assert!((0.0..=hole).contains(&h_near));
        prop_assert!((0.0..=hole).contains(&h_far));
        prop_assert!(h_near >= h_far);
    }

    #[test]
    fn table_never_has_negative_or_missing_phases(
        flood in -100.0f64..5000.0,
        active in -100.0f64..3000.0,
        drain in -100.0f64..5000.0,
    ) {
        let (clean, _) = HydroSettings::from_ptimes([flood, active, drain]).sanitized();
        let t = PhaseTable::build(&clean);
        prop_assert_eq!(t.len(), PhaseTable::LEN);
        // Fill plus hold covers the flood time whenever the pump time fits in it.
        if clean.active_pump_secs <= clean.flood_secs {
            let e = t.entries();
            let flood_total = (e[0].duration + e[1].duration).as_secs_f64();
            prop_assert!((flood_total - clean.flood_secs).abs() < 1e-6);
        }
    }

    #[test]
    fn constant_input_converges_to_itself(level in -500.0f64..500.0, order in 1usize..=4) {
        let mut f = LowPassFilter::new(5.0, 50.0, order).unwrap();
        let mut y = 0.0;
        for _ in 0..500 {
            y = f.filter(level);
        }
        prop_assert!((y - level).abs() < 1e-6 * level.abs().max(1.0));
    }

    #[test]
    fn rearm_keeps_elapsed(first in 1u64..1000, elapsed_frac in 0.0f64..1.0, second in 1u64..1000) {
        let t0 = Instant::now();
        let mut t = Timer::new(Duration::from_secs(first));
        t.start(t0);
        let elapsed = Duration::from_secs_f64(first as f64 * elapsed_frac);
        t.rearm_interval(Duration::from_secs(second));
        let now = t0 + elapsed;
        let expected = Duration::from_secs(second).saturating_sub(elapsed);
        prop_assert_eq!(t.remaining(now).unwrap_or(Duration::ZERO), expected);
    }

    #[test]
    fn user_override_always_wins(events in proptest::collection::vec(0u8..3, 0..40)) {
        let mut f = SafetyFlags::default();
        for e in events {
            match e {
                0 => f.on_overflow(),
                1 => { f.on_no_overflow(); }
                _ => { f.on_user_toggle(); }
            }
            if f.user_override_active || f.overflow_active {
                prop_assert!(f.is_paused());
            } else {
                prop_assert!(!f.is_paused());
            }
        }
    }

    #[test]
    fn latch_only_emits_alternating_edges(samples in proptest::collection::vec(any::<bool>(), 0..200)) {
        let mut latch = OverflowLatch::new(2);
        let mut last = None;
        for s in samples {
            if let Some(edge) = latch.update(s) {
                prop_assert_ne!(Some(edge), last);
                last = Some(edge);
            }
        }
    }
}
