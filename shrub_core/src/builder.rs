//! Type-state builder for `Controller` and generic `build_controller`.
//!
//! The builder enforces at compile time that sensors, hydro actuators, and
//! dose actuators are provided before `build()` is available. `try_build()`
//! is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use eyre::WrapErr;
use shrub_traits::clock::{Clock, MonotonicClock};
use shrub_traits::{DoseActuators, HydroActuators, Sensors};

use crate::conditioner::Conditioner;
use crate::config::{ControllerCfg, FilterCfg, LevelCfg, ProbeCfg, Settings};
use crate::controller::{ControllerCore, FilterBank};
use crate::error::{BuildError, Result};
use crate::filter::LowPassFilter;
use crate::hydro::{HydroConfig, HydroMachine};
use crate::level::{LevelMonitor, OverflowLatch};
use crate::status::SensorSnapshot;
use crate::timer::Timer;
use crate::util::{period, samples_in};

/// Dynamically dispatched controller, as assembled by the CLI.
pub type Controller =
    ControllerCore<Box<dyn Sensors>, Box<dyn HydroActuators>, Box<dyn DoseActuators>>;

pub struct Missing;
pub struct Set;

/// Builder for `Controller`. All fields are validated on `build()`.
pub struct ControllerBuilder<S, H, D> {
    sensors: Option<Box<dyn Sensors>>,
    hydro_actuators: Option<Box<dyn HydroActuators>>,
    dose_actuators: Option<Box<dyn DoseActuators>>,
    cfg: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _h: PhantomData<H>,
    _d: PhantomData<D>,
}

impl Default for ControllerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensors: None,
            hydro_actuators: None,
            dose_actuators: None,
            cfg: ControllerCfg::default(),
            clock: None,
            _s: PhantomData,
            _h: PhantomData,
            _d: PhantomData,
        }
    }
}

impl Controller {
    pub fn builder() -> ControllerBuilder<Missing, Missing, Missing> {
        ControllerBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(cfg: &ControllerCfg) -> Result<()> {
    let f = &cfg.filter;
    if !f.sample_rate_hz.is_finite() || f.sample_rate_hz <= 0.0 {
        return Err(invalid("sample_rate_hz must be > 0"));
    }
    if f.order == 0 || f.order > 8 {
        return Err(invalid("filter order must be in 1..=8"));
    }
    if !f.warmup_secs.is_finite() || f.warmup_secs < 0.0 {
        return Err(invalid("warmup_secs must be >= 0"));
    }
    if !cfg.level.hole_depth_cm.is_finite() || cfg.level.hole_depth_cm <= 0.0 {
        return Err(invalid("hole_depth_cm must be > 0"));
    }
    if cfg.level.clear_confirmations == 0 {
        return Err(invalid("clear_confirmations must be >= 1"));
    }
    if cfg.hydro.pump_power > 100 || cfg.hydro.test_power > 100 {
        return Err(invalid("pump power must be in 0..=100"));
    }
    if cfg.save_interval.is_zero() {
        return Err(invalid("save_interval must be > 0"));
    }
    let p = &cfg.probes.ph;
    if (p.neutral_mv - p.acid_mv).abs() < f64::EPSILON {
        return Err(invalid("pH neutral and acid voltages must differ"));
    }
    Ok(())
}

fn design(f: &FilterCfg, cutoff_hz: f64, signal: &'static str) -> Result<LowPassFilter> {
    LowPassFilter::new(cutoff_hz, f.sample_rate_hz, f.order)
        .wrap_err_with(|| format!("designing {signal} filter"))
}

/// Validate configuration and construct a `ControllerCore`.
///
/// Shared by `ControllerBuilder::try_build()` and `build_controller()`.
fn validate_and_build<S: Sensors, H: HydroActuators, D: DoseActuators>(
    sensors: S,
    hydro_actuators: H,
    dose_actuators: D,
    cfg: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ControllerCore<S, H, D>> {
    validate(&cfg)?;

    let filters = FilterBank {
        sonar: design(&cfg.filter, cfg.filter.sonar_cutoff_hz, "sonar")?,
        ph: design(&cfg.filter, cfg.filter.ph_cutoff_hz, "pH")?,
        ec: design(&cfg.filter, cfg.filter.ec_cutoff_hz, "EC")?,
        temp: design(&cfg.filter, cfg.filter.temp_cutoff_hz, "temperature")?,
    };

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };

    let settings = cfg.settings;
    let overflow_height_cm = if settings.overflow_height_cm.is_finite() {
        settings
            .overflow_height_cm
            .clamp(0.0, cfg.level.hole_depth_cm)
    } else {
        Settings::default().overflow_height_cm
    };

    let hydro = HydroMachine::new(hydro_actuators, settings.hydro, cfg.hydro);
    let conditioner = Conditioner::new(dose_actuators, settings.dose);
    let mut cfg = cfg;
    cfg.settings = Settings {
        hydro: *hydro.settings(),
        dose: *conditioner.settings(),
        overflow_height_cm,
    };

    Ok(ControllerCore {
        sensors,
        hydro,
        conditioner,
        filters,
        level: LevelMonitor::new(cfg.level.hole_depth_cm, overflow_height_cm),
        latch: OverflowLatch::new(cfg.level.clear_confirmations),
        ph_probe: cfg.probes.ph,
        ec_probe: cfg.probes.ec,
        sample_timer: Timer::new(period(cfg.filter.sample_rate_hz)),
        save_timer: Timer::new(cfg.save_interval),
        warmup_samples: samples_in(cfg.filter.warmup_secs, cfg.filter.sample_rate_hz),
        samples_taken: 0,
        last: SensorSnapshot::default(),
        clock,
        cfg,
    })
}

impl<S, H, D> ControllerBuilder<S, H, D> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Controller> {
        let sensors = self
            .sensors
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensors))?;
        let hydro = self
            .hydro_actuators
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHydroActuators))?;
        let dose = self
            .dose_actuators
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDoseActuators))?;
        validate_and_build(sensors, hydro, dose, self.cfg, self.clock)
    }

    pub fn with_config(mut self, cfg: ControllerCfg) -> Self {
        self.cfg = cfg;
        self
    }
    pub fn with_filter(mut self, filter: FilterCfg) -> Self {
        self.cfg.filter = filter;
        self
    }
    pub fn with_level(mut self, level: LevelCfg) -> Self {
        self.cfg.level = level;
        self
    }
    pub fn with_probes(mut self, probes: ProbeCfg) -> Self {
        self.cfg.probes = probes;
        self
    }
    pub fn with_hydro_config(mut self, hydro: HydroConfig) -> Self {
        self.cfg.hydro = hydro;
        self
    }
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.cfg.settings = settings;
        self
    }
    pub fn with_save_interval(mut self, every: std::time::Duration) -> Self {
        self.cfg.save_interval = every;
        self
    }
    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn retype<S2, H2, D2>(self) -> ControllerBuilder<S2, H2, D2> {
        ControllerBuilder {
            sensors: self.sensors,
            hydro_actuators: self.hydro_actuators,
            dose_actuators: self.dose_actuators,
            cfg: self.cfg,
            clock: self.clock,
            _s: PhantomData,
            _h: PhantomData,
            _d: PhantomData,
        }
    }
}

impl<H, D> ControllerBuilder<Missing, H, D> {
    pub fn with_sensors(mut self, sensors: impl Sensors + 'static) -> ControllerBuilder<Set, H, D> {
        self.sensors = Some(Box::new(sensors));
        self.retype()
    }
}

impl<S, D> ControllerBuilder<S, Missing, D> {
    pub fn with_hydro_actuators(
        mut self,
        actuators: impl HydroActuators + 'static,
    ) -> ControllerBuilder<S, Set, D> {
        self.hydro_actuators = Some(Box::new(actuators));
        self.retype()
    }
}

impl<S, H> ControllerBuilder<S, H, Missing> {
    pub fn with_dose_actuators(
        mut self,
        actuators: impl DoseActuators + 'static,
    ) -> ControllerBuilder<S, H, Set> {
        self.dose_actuators = Some(Box::new(actuators));
        self.retype()
    }
}

impl ControllerBuilder<Set, Set, Set> {
    /// Validate and build. Only available once all I/O is set.
    pub fn build(self) -> Result<Controller> {
        self.try_build()
    }
}

/// Build a statically dispatched controller from concrete I/O.
pub fn build_controller<S, H, D>(
    sensors: S,
    hydro_actuators: H,
    dose_actuators: D,
    cfg: ControllerCfg,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<ControllerCore<S, H, D>>
where
    S: Sensors,
    H: HydroActuators,
    D: DoseActuators,
{
    validate_and_build(sensors, hydro_actuators, dose_actuators, cfg, clock)
}
