//! `From` implementations bridging `shrub_config` types to `shrub_core` types.

use std::time::Duration;

use crate::conditioner::{DoseSettings, DoseThresholds};
use crate::config::{ControllerCfg, FilterCfg, LevelCfg, ProbeCfg, Settings};
use crate::hydro::HydroConfig;
use crate::phase::HydroSettings;
use crate::probe::{EcProbe, PhProbe};
use crate::util::duration_from_secs;

// ── FilterCfg ────────────────────────────────────────────────────────────────

impl From<&shrub_config::FilterCfg> for FilterCfg {
    fn from(c: &shrub_config::FilterCfg) -> Self {
        Self {
            sample_rate_hz: c.sample_rate_hz,
            order: c.order,
            sonar_cutoff_hz: c.sonar_cutoff_hz,
            ph_cutoff_hz: c.ph_cutoff_hz,
            ec_cutoff_hz: c.ec_cutoff_hz,
            temp_cutoff_hz: c.temp_cutoff_hz,
            warmup_secs: c.warmup_secs,
        }
    }
}

// ── LevelCfg ─────────────────────────────────────────────────────────────────

impl From<&shrub_config::LevelCfg> for LevelCfg {
    fn from(c: &shrub_config::LevelCfg) -> Self {
        Self {
            hole_depth_cm: c.hole_depth_cm,
            clear_confirmations: c.clear_confirmations,
        }
    }
}

// ── Probes ───────────────────────────────────────────────────────────────────

impl From<&shrub_config::ProbesCfg> for ProbeCfg {
    fn from(c: &shrub_config::ProbesCfg) -> Self {
        Self {
            ph: PhProbe::new(c.ph_neutral_mv, c.ph_acid_mv),
            ec: EcProbe::new(c.ec_k_low, c.ec_k_high),
        }
    }
}

// ── Hydro ────────────────────────────────────────────────────────────────────

impl From<&shrub_config::HydroCfg> for HydroConfig {
    fn from(c: &shrub_config::HydroCfg) -> Self {
        Self {
            pump_power: c.pump_power,
            test_power: c.test_power,
            test_duration: duration_from_secs(c.test_secs),
        }
    }
}

impl From<&shrub_config::HydroCfg> for HydroSettings {
    fn from(c: &shrub_config::HydroCfg) -> Self {
        Self {
            flood_secs: c.flood_secs,
            active_pump_secs: c.active_pump_secs,
            drain_secs: c.drain_secs,
            valve_drain_factor: c.valve_drain_factor,
        }
    }
}

// ── Dosing ───────────────────────────────────────────────────────────────────

impl From<&shrub_config::DosingCfg> for DoseSettings {
    fn from(c: &shrub_config::DosingCfg) -> Self {
        Self {
            thresholds: DoseThresholds {
                ph_high: c.ph_high,
                ph_low: c.ph_low,
                ec_high: c.ec_high,
                ec_low: c.ec_low,
            },
            dose_duration: duration_from_secs(c.dose_secs),
            settle_duration: duration_from_secs(c.settle_secs),
            test_duration: duration_from_secs(c.test_secs),
        }
    }
}

// ── Settings / ControllerCfg ─────────────────────────────────────────────────

impl From<&shrub_config::Config> for Settings {
    fn from(c: &shrub_config::Config) -> Self {
        Self {
            hydro: HydroSettings::from(&c.hydro),
            dose: DoseSettings::from(&c.dosing),
            overflow_height_cm: c.level.overflow_height_cm,
        }
    }
}

impl From<&shrub_config::Config> for ControllerCfg {
    fn from(c: &shrub_config::Config) -> Self {
        Self {
            filter: FilterCfg::from(&c.filter),
            level: LevelCfg::from(&c.level),
            probes: ProbeCfg::from(&c.probes),
            hydro: HydroConfig::from(&c.hydro),
            settings: Settings::from(c),
            save_interval: Duration::from_secs(c.persistence.save_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_agree_across_crates() {
        let cfg = ControllerCfg::from(&shrub_config::Config::default());
        assert_eq!(cfg, ControllerCfg::default());
    }

    #[test]
    fn negative_durations_become_zero() {
        let dosing = shrub_config::DosingCfg {
            settle_secs: -3.0,
            ..Default::default()
        };
        assert_eq!(DoseSettings::from(&dosing).settle_duration, Duration::ZERO);
    }

    #[test]
    fn huge_durations_saturate_instead_of_vanishing() {
        let cfg = shrub_config::Config {
            dosing: shrub_config::DosingCfg {
                settle_secs: 1e30,
                ..Default::default()
            },
            ..Default::default()
        };
        let settle = ControllerCfg::from(&cfg).settings.dose.settle_duration;
        assert_eq!(settle, crate::Timer::MAX_INTERVAL);
        assert_eq!(
            crate::Timer::MAX_INTERVAL.as_secs_f64(),
            shrub_config::MAX_DURATION_SECS
        );
    }
}
