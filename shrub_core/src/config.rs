//! Runtime configuration for the controller.
//!
//! These are separate from the TOML-deserialized config in `shrub_config`;
//! `conversions` bridges the two.

use std::time::Duration;

use crate::conditioner::DoseSettings;
use crate::hydro::HydroConfig;
use crate::level::HOLE_DEPTH_CM;
use crate::phase::HydroSettings;
use crate::probe::{EcProbe, PhProbe};

/// Low-pass filter design for the four sensor signals.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCfg {
    /// Rate at which sensors are sampled and filters are discretized.
    pub sample_rate_hz: f64,
    pub order: usize,
    pub sonar_cutoff_hz: f64,
    pub ph_cutoff_hz: f64,
    pub ec_cutoff_hz: f64,
    pub temp_cutoff_hz: f64,
    /// Samples taken during this window only prime the filters; no
    /// decision is made on them.
    pub warmup_secs: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50.0,
            order: 2,
            sonar_cutoff_hz: 7.0,
            ph_cutoff_hz: 5.0,
            ec_cutoff_hz: 5.0,
            temp_cutoff_hz: 5.0,
            warmup_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelCfg {
    pub hole_depth_cm: f64,
    /// Consecutive clear samples before overflow is released.
    pub clear_confirmations: u32,
}

impl Default for LevelCfg {
    fn default() -> Self {
        Self {
            hole_depth_cm: HOLE_DEPTH_CM,
            clear_confirmations: 2,
        }
    }
}

/// Probe calibration constants.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeCfg {
    pub ph: PhProbe,
    pub ec: EcProbe,
}

/// User-adjustable settings, applied live through `update_settings`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub hydro: HydroSettings,
    pub dose: DoseSettings,
    /// Water height at or above which the reservoir counts as overflowing.
    pub overflow_height_cm: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hydro: HydroSettings::default(),
            dose: DoseSettings::default(),
            overflow_height_cm: 16.0,
        }
    }
}

/// Everything the controller needs besides its I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerCfg {
    pub filter: FilterCfg,
    pub level: LevelCfg,
    pub probes: ProbeCfg,
    pub hydro: HydroConfig,
    pub settings: Settings,
    /// How often a cycle snapshot is offered for durable storage.
    pub save_interval: Duration,
}

impl Default for ControllerCfg {
    fn default() -> Self {
        Self {
            filter: FilterCfg::default(),
            level: LevelCfg::default(),
            probes: ProbeCfg::default(),
            hydro: HydroConfig::default(),
            settings: Settings::default(),
            save_interval: Duration::from_secs(600),
        }
    }
}
