//! Common time/period helpers for shrub_core.

use std::time::Duration;

use crate::timer::Timer;

/// Seconds from config or storage as a timer interval. Negative or NaN
/// gives zero; anything longer than [`Timer::MAX_INTERVAL`] is clamped to it.
#[inline]
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs)
        .unwrap_or(Timer::MAX_INTERVAL)
        .min(Timer::MAX_INTERVAL)
}

/// Sampling period for a rate in Hz. Non-positive or non-finite rates give
/// one second; the result is never shorter than 1 µs.
#[inline]
pub fn period(hz: f64) -> Duration {
    if !hz.is_finite() || hz <= 0.0 {
        return Duration::from_secs(1);
    }
    duration_from_secs(1.0 / hz).max(Duration::from_micros(1))
}

/// Number of samples taken over `secs` at `hz`, rounded up.
#[inline]
pub fn samples_in(secs: f64, hz: f64) -> u32 {
    let n = (secs * hz).ceil();
    if n.is_finite() && n > 0.0 {
        n.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

/// `HH:MM:SS`, hours not wrapped.
pub fn format_hms(d: Duration) -> String {
    let total = d.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_formatting() {
        assert_eq!(format_hms(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_hms(Duration::from_secs(1140)), "00:19:00");
        assert_eq!(format_hms(Duration::from_secs(4 * 3600 + 61)), "04:01:01");
    }

    #[test]
    fn period_guards_bad_rates() {
        assert!((period(50.0).as_secs_f64() - 0.02).abs() < 1e-9);
        assert_eq!(period(0.0), Duration::from_secs(1));
        assert_eq!(period(f64::NAN), Duration::from_secs(1));
    }

    #[test]
    fn warmup_sample_count() {
        assert_eq!(samples_in(1.0, 50.0), 50);
        assert_eq!(samples_in(0.0, 50.0), 0);
        assert_eq!(samples_in(0.5, 3.0), 2);
    }
}
