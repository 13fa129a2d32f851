#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and the on-disk files of the reservoir controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `settings` reads and writes the operator settings CSV.
//! - `state` persists the cycle position and the probe calibration.
use serde::Deserialize;

pub mod atomic;
pub mod settings;
pub mod state;

pub use atomic::write_atomic;
pub use settings::{
    SettingClamp, UserSettings, load_or_create_settings, load_settings_csv, save_settings_csv,
};
pub use state::{
    CycleState, ProbeCalibration, load_cycle_state, load_probe_calibration, save_cycle_state,
    save_probe_calibration,
};

/// GPIO and bus assignments for the Raspberry Pi build.
#[derive(Debug, Deserialize, Clone)]
pub struct Pins {
    /// Channel pump, driven with software PWM.
    pub pump: u8,
    pub top_valve: u8,
    pub bottom_valve: u8,
    pub lamp: u8,
    pub acid_pump: u8,
    pub base_pump: u8,
    pub nutrient_pump: u8,
    pub sonar_trigger: u8,
    pub sonar_echo: u8,
    /// Max wait for a sonar echo edge.
    #[serde(default = "default_echo_timeout_ms")]
    pub sonar_timeout_ms: u64,
    /// I2C address of the ADS1115 carrying the pH and EC probes.
    #[serde(default = "default_adc_address")]
    pub adc_address: u16,
    #[serde(default)]
    pub ph_channel: u8,
    #[serde(default = "default_ec_channel")]
    pub ec_channel: u8,
    /// 1-wire sysfs directory of the DS18B20; first `28-*` device when absent.
    #[serde(default)]
    pub onewire_device: Option<String>,
}

fn default_echo_timeout_ms() -> u64 {
    30
}

fn default_adc_address() -> u16 {
    0x48
}

fn default_ec_channel() -> u8 {
    1
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterCfg {
    pub sample_rate_hz: f64,
    pub order: usize,
    pub sonar_cutoff_hz: f64,
    pub ph_cutoff_hz: f64,
    pub ec_cutoff_hz: f64,
    pub temp_cutoff_hz: f64,
    /// Samples during this window only prime the filters.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HydroCfg {
    /// Fill plus hold, seconds.
    pub flood_secs: f64,
    pub active_pump_secs: f64,
    /// Both drains plus settle, seconds.
    pub drain_secs: f64,
    pub valve_drain_factor: f64,
    /// Channel pump power during fill, percent.
    pub pump_power: u8,
    pub test_power: u8,
    pub test_secs: f64,
}

impl Default for HydroCfg {
    fn default() -> Self {
        Self {
            flood_secs: 19.0 * 60.0,
            active_pump_secs: 120.0,
            drain_secs: 6.0 * 60.0,
            valve_drain_factor: 1.0,
            pump_power: 30,
            test_power: 60,
            test_secs: 6.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LevelCfg {
    pub hole_depth_cm: f64,
    pub overflow_height_cm: f64,
    /// Consecutive clear samples before overflow is released.
    pub clear_confirmations: u32,
}

impl Default for LevelCfg {
    fn default() -> Self {
        Self {
            hole_depth_cm: 35.0 * 2.54,
            overflow_height_cm: 16.0,
            clear_confirmations: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DosingCfg {
    pub ph_high: f64,
    pub ph_low: f64,
    pub ec_high: f64,
    pub ec_low: f64,
    pub dose_secs: f64,
    pub settle_secs: f64,
    pub test_secs: f64,
}

impl Default for DosingCfg {
    fn default() -> Self {
        Self {
            ph_high: 9.0,
            ph_low: 4.0,
            ec_high: 2.0,
            ec_low: 0.01,
            dose_secs: 1.0,
            settle_secs: 300.0,
            test_secs: 6.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ProbesCfg {
    pub ph_neutral_mv: f64,
    pub ph_acid_mv: f64,
    pub ec_k_low: f64,
    pub ec_k_high: f64,
}

impl Default for ProbesCfg {
    fn default() -> Self {
        Self {
            ph_neutral_mv: 1500.0,
            ph_acid_mv: 2032.44,
            ec_k_low: 1.0,
            ec_k_high: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceCfg {
    /// Cycle position, rewritten every `save_interval_secs` and on shutdown.
    pub state_file: String,
    /// Operator settings CSV; created with defaults when missing.
    pub settings_file: Option<String>,
    /// Probe calibration CSV written by the calibrate commands.
    pub calibration_file: Option<String>,
    pub save_interval_secs: u64,
}

impl Default for PersistenceCfg {
    fn default() -> Self {
        Self {
            state_file: "shrub_state.csv".to_string(),
            settings_file: None,
            calibration_file: None,
            save_interval_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RunnerCfg {
    /// Scheduler tick period.
    pub tick_ms: u64,
    /// Print the status lines every this many seconds (0 disables).
    pub status_every_secs: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            status_every_secs: 8,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Only needed by the hardware build.
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub hydro: HydroCfg,
    #[serde(default)]
    pub level: LevelCfg,
    #[serde(default)]
    pub dosing: DosingCfg,
    #[serde(default)]
    pub probes: ProbesCfg,
    #[serde(default)]
    pub persistence: PersistenceCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub runner: RunnerCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Longest timer the controller runs: one week.
pub const MAX_DURATION_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

fn finite_non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn duration_ok(v: f64) -> bool {
    finite_non_negative(v) && v <= MAX_DURATION_SECS
}

impl Config {
    /// Apply operator settings over the TOML values. Out-of-range values are
    /// pulled to the nearest valid one; the returned list names each change.
    pub fn apply_settings(&mut self, s: &UserSettings) -> Vec<SettingClamp> {
        let (s, clamped) = s.clamped(self.level.hole_depth_cm);
        self.hydro.flood_secs = s.flood_secs;
        self.hydro.active_pump_secs = s.active_pump_secs;
        self.hydro.drain_secs = s.drain_secs;
        self.level.overflow_height_cm = s.overflow_height_cm;
        self.dosing.ph_high = s.ph_high;
        self.dosing.ph_low = s.ph_low;
        self.dosing.ec_high = s.ec_high;
        self.dosing.ec_low = s.ec_low;
        clamped
    }

    /// Operator-facing view of the current values.
    pub fn user_settings(&self) -> UserSettings {
        UserSettings {
            flood_secs: self.hydro.flood_secs,
            active_pump_secs: self.hydro.active_pump_secs,
            drain_secs: self.hydro.drain_secs,
            overflow_height_cm: self.level.overflow_height_cm,
            ph_high: self.dosing.ph_high,
            ph_low: self.dosing.ph_low,
            ec_high: self.dosing.ec_high,
            ec_low: self.dosing.ec_low,
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Filter
        let f = &self.filter;
        if !(f.sample_rate_hz.is_finite() && f.sample_rate_hz > 0.0) {
            eyre::bail!("filter.sample_rate_hz must be > 0");
        }
        if f.order == 0 || f.order > 8 {
            eyre::bail!("filter.order must be in 1..=8");
        }
        let nyquist = f.sample_rate_hz / 2.0;
        for (key, cutoff) in [
            ("filter.sonar_cutoff_hz", f.sonar_cutoff_hz),
            ("filter.ph_cutoff_hz", f.ph_cutoff_hz),
            ("filter.ec_cutoff_hz", f.ec_cutoff_hz),
            ("filter.temp_cutoff_hz", f.temp_cutoff_hz),
        ] {
            if !(cutoff.is_finite() && cutoff > 0.0 && cutoff < nyquist) {
                eyre::bail!("{key} must be in (0, sample_rate_hz / 2)");
            }
        }
        if !duration_ok(f.warmup_secs) {
            eyre::bail!("filter.warmup_secs must be in [0, {MAX_DURATION_SECS}]");
        }

        // Hydro
        let h = &self.hydro;
        for (key, v) in [
            ("hydro.flood_secs", h.flood_secs),
            ("hydro.active_pump_secs", h.active_pump_secs),
            ("hydro.drain_secs", h.drain_secs),
            ("hydro.test_secs", h.test_secs),
        ] {
            if !duration_ok(v) {
                eyre::bail!("{key} must be in [0, {MAX_DURATION_SECS}]");
            }
        }
        if !finite_non_negative(h.valve_drain_factor) {
            eyre::bail!("hydro.valve_drain_factor must be >= 0");
        }
        if h.pump_power > 100 {
            eyre::bail!("hydro.pump_power must be in 0..=100");
        }
        if h.test_power > 100 {
            eyre::bail!("hydro.test_power must be in 0..=100");
        }

        // Level
        if !(self.level.hole_depth_cm.is_finite() && self.level.hole_depth_cm > 0.0) {
            eyre::bail!("level.hole_depth_cm must be > 0");
        }
        if !finite_non_negative(self.level.overflow_height_cm)
            || self.level.overflow_height_cm > self.level.hole_depth_cm
        {
            eyre::bail!("level.overflow_height_cm must be in [0, level.hole_depth_cm]");
        }
        if self.level.clear_confirmations == 0 {
            eyre::bail!("level.clear_confirmations must be >= 1");
        }

        // Dosing
        let d = &self.dosing;
        for (key, v) in [("dosing.ph_high", d.ph_high), ("dosing.ph_low", d.ph_low)] {
            if !(v.is_finite() && (0.0..=14.0).contains(&v)) {
                eyre::bail!("{key} must be in [0, 14]");
            }
        }
        if d.ph_low > d.ph_high {
            eyre::bail!("dosing.ph_low must be <= dosing.ph_high");
        }
        for (key, v) in [("dosing.ec_high", d.ec_high), ("dosing.ec_low", d.ec_low)] {
            if !finite_non_negative(v) {
                eyre::bail!("{key} must be >= 0");
            }
        }
        if !(duration_ok(d.dose_secs) && d.dose_secs > 0.0) {
            eyre::bail!("dosing.dose_secs must be in (0, {MAX_DURATION_SECS}]");
        }
        for (key, v) in [
            ("dosing.settle_secs", d.settle_secs),
            ("dosing.test_secs", d.test_secs),
        ] {
            if !duration_ok(v) {
                eyre::bail!("{key} must be in [0, {MAX_DURATION_SECS}]");
            }
        }

        // Probes
        let p = &self.probes;
        if (p.ph_neutral_mv - p.ph_acid_mv).abs() < f64::EPSILON {
            eyre::bail!("probes.ph_neutral_mv and probes.ph_acid_mv must differ");
        }
        if !(p.ec_k_low > 0.0 && p.ec_k_high > 0.0) {
            eyre::bail!("probes.ec_k_low and probes.ec_k_high must be > 0");
        }

        // Persistence
        if self.persistence.state_file.trim().is_empty() {
            eyre::bail!("persistence.state_file must not be empty");
        }
        if self.persistence.save_interval_secs == 0 {
            eyre::bail!("persistence.save_interval_secs must be >= 1");
        }

        // Runner
        if self.runner.tick_ms == 0 {
            eyre::bail!("runner.tick_ms must be >= 1");
        }

        // Pins
        if let Some(pins) = &self.pins
            && pins.sonar_timeout_ms == 0
        {
            eyre::bail!("pins.sonar_timeout_ms must be >= 1");
        }

        Ok(())
    }
}
