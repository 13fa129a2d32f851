//! The orchestrating control loop (`ControllerCore`).
//!
//! One `tick` polls the sampling timer, reads and filters every sensor when
//! it fires, turns the level into overflow edges for both machines, then
//! lets each machine poll its own timers. Nothing here sleeps; the caller
//! paces ticks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shrub_traits::{Clock, DoseActuators, HydroActuators, Sensors, TempUnit};

use crate::conditioner::{Conditioner, DoseEvent};
use crate::config::{ControllerCfg, Settings};
use crate::filter::LowPassFilter;
use crate::hydro::{CycleSnapshot, HydroEvent, HydroMachine};
use crate::level::{LevelEdge, LevelMonitor, OverflowLatch};
use crate::probe::{EcProbe, PhProbe};
use crate::status::{self, SensorFaults, SensorSnapshot, StatusInput};
use crate::timer::Timer;

/// Fallback temperature when the probe cannot be read.
pub const FALLBACK_TEMP_C: f64 = 25.0;

/// One event delivered to a state machine during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Hydro(HydroEvent),
    Dose(DoseEvent),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
    /// Present when the save cadence elapsed; the caller persists it.
    pub save: Option<CycleSnapshot>,
    pub dispatched: Vec<Dispatched>,
    pub sampled: bool,
}

/// One low-pass filter per physical signal.
#[derive(Debug, Clone)]
pub struct FilterBank {
    pub sonar: LowPassFilter,
    pub ph: LowPassFilter,
    pub ec: LowPassFilter,
    pub temp: LowPassFilter,
}

impl FilterBank {
    /// All four designs must succeed before any filter changes.
    fn recalc_all(&mut self, sample_hz: f64) -> Result<(), crate::error::FilterError> {
        let designs = [
            self.sonar.design_for(sample_hz)?,
            self.ph.design_for(sample_hz)?,
            self.ec.design_for(sample_hz)?,
            self.temp.design_for(sample_hz)?,
        ];
        let filters = [&mut self.sonar, &mut self.ph, &mut self.ec, &mut self.temp];
        for (f, coeffs) in filters.into_iter().zip(designs) {
            let cutoff = f.cutoff_hz();
            f.install(coeffs, sample_hz, cutoff);
        }
        Ok(())
    }
}

pub struct ControllerCore<S: Sensors, H: HydroActuators, D: DoseActuators> {
    pub(crate) sensors: S,
    pub(crate) hydro: HydroMachine<H>,
    pub(crate) conditioner: Conditioner<D>,
    pub(crate) filters: FilterBank,
    pub(crate) level: LevelMonitor,
    pub(crate) latch: OverflowLatch,
    pub(crate) ph_probe: PhProbe,
    pub(crate) ec_probe: EcProbe,
    pub(crate) cfg: ControllerCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) sample_timer: Timer,
    pub(crate) save_timer: Timer,
    pub(crate) warmup_samples: u32,
    pub(crate) samples_taken: u32,
    pub(crate) last: SensorSnapshot,
}

impl<S: Sensors, H: HydroActuators, D: DoseActuators> core::fmt::Debug for ControllerCore<S, H, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerCore")
            .field("hydro", &self.hydro)
            .field("conditioner", &self.conditioner)
            .field("last", &self.last)
            .finish()
    }
}

impl<S: Sensors, H: HydroActuators, D: DoseActuators> ControllerCore<S, H, D> {
    /// Start a fresh cycle at phase 0.
    pub fn begin(&mut self) {
        let now = self.clock.now();
        self.hydro.begin(now);
        self.start_common(now);
    }

    /// Resume the cycle recorded in `snapshot`.
    pub fn resume(&mut self, snapshot: CycleSnapshot) {
        let now = self.clock.now();
        let remaining = crate::util::duration_from_secs(snapshot.remaining_secs);
        self.hydro.restore(snapshot.phase_index, remaining, now);
        self.start_common(now);
    }

    fn start_common(&mut self, now: Instant) {
        self.conditioner.begin();
        self.samples_taken = 0;
        self.sample_timer.start(now);
        self.save_timer.start(now);
    }

    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        let mut out = TickOutcome::default();

        let mut reading = None;
        if self.sample_timer.poll(now).is_due() {
            self.sample_timer.start(now);
            reading = self.sample(now, &mut out.dispatched);
            out.sampled = true;
        }

        for e in self.hydro.tick(now) {
            out.dispatched.push(Dispatched::Hydro(e));
        }
        let view = self.hydro.view();
        for e in self.conditioner.tick(now, reading, view) {
            out.dispatched.push(Dispatched::Dose(e));
        }

        if self.save_timer.poll(now).is_due() {
            self.save_timer.start(now);
            out.save = Some(self.hydro.snapshot(now));
        }
        out
    }

    /// Read, convert, and filter every sensor. Returns the pH/EC pair for
    /// the range check, or `None` while warming up or when either read
    /// failed. Only a sonar failure reaches the overflow latch during
    /// warm-up.
    fn sample(&mut self, now: Instant, dispatched: &mut Vec<Dispatched>) -> Option<(f64, f64)> {
        let mut faults = SensorFaults::default();

        let distance = match self.sensors.read_distance() {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "sonar read failed; assuming reservoir full");
                faults.sonar = true;
                0.0
            }
        };
        let distance_cm = self.filters.sonar.filter(distance);
        let level = self.level.assess(distance_cm, faults.sonar);

        let temp = match self.sensors.read_temperature(TempUnit::Celsius) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, fallback = FALLBACK_TEMP_C, "temperature read failed");
                faults.temp = true;
                FALLBACK_TEMP_C
            }
        };
        let temp_c = self.filters.temp.filter(temp);

        let ph_mv = match self.sensors.read_ph_voltage() {
            Ok(mv) => mv,
            Err(e) => {
                tracing::warn!(error = %e, "pH read failed; using neutral voltage");
                faults.ph = true;
                self.ph_probe.neutral_mv
            }
        };
        let ph = self.filters.ph.filter(self.ph_probe.read_ph(ph_mv));

        let ec_mv = match self.sensors.read_ec_voltage() {
            Ok(mv) => mv,
            Err(e) => {
                tracing::warn!(error = %e, "EC read failed; using 0 mV");
                faults.ec = true;
                0.0
            }
        };
        let ec = self.filters.ec.filter(self.ec_probe.read_ec(ec_mv, temp_c));

        self.last = SensorSnapshot {
            distance_cm,
            height_cm: level.height_cm,
            ph,
            ec,
            temp_c,
            overflowing: level.overflowing,
            faults,
        };

        // A failed sonar read latches overflow even while the filters prime.
        let warming = self.samples_taken < self.warmup_samples;
        if warming {
            self.samples_taken += 1;
            if !level.read_failed {
                return None;
            }
        }

        match self.latch.update(level.overflowing) {
            Some(LevelEdge::Overflow) => {
                tracing::warn!(
                    height_cm = level.height_cm,
                    threshold_cm = self.level.overflow_height_cm(),
                    sonar_failed = level.read_failed,
                    "overflow detected"
                );
                self.hydro.handle(HydroEvent::Overflow, now);
                self.conditioner.handle(DoseEvent::Overflow, now);
                dispatched.push(Dispatched::Hydro(HydroEvent::Overflow));
                dispatched.push(Dispatched::Dose(DoseEvent::Overflow));
            }
            Some(LevelEdge::NoOverflow) => {
                tracing::info!(height_cm = level.height_cm, "overflow cleared");
                self.hydro.handle(HydroEvent::NoOverflow, now);
                self.conditioner.handle(DoseEvent::NoOverflow, now);
                dispatched.push(Dispatched::Hydro(HydroEvent::NoOverflow));
                dispatched.push(Dispatched::Dose(DoseEvent::NoOverflow));
            }
            None => {}
        }

        if warming || faults.ph || faults.ec {
            None
        } else {
            Some((ph, ec))
        }
    }

    /// Route a UI event by name. Unknown or non-UI names are ignored.
    pub fn dispatch_named(&mut self, name: &str) -> Vec<Dispatched> {
        let now = self.clock.now();
        let event = match name.parse::<HydroEvent>() {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "event ignored");
                return Vec::new();
            }
        };
        match event {
            HydroEvent::UserToggle => {
                self.hydro.handle(HydroEvent::UserToggle, now);
                self.conditioner.handle(DoseEvent::UserToggle, now);
                vec![
                    Dispatched::Hydro(HydroEvent::UserToggle),
                    Dispatched::Dose(DoseEvent::UserToggle),
                ]
            }
            HydroEvent::Test => {
                self.hydro.handle(HydroEvent::Test, now);
                self.conditioner.handle(DoseEvent::Test, now);
                vec![
                    Dispatched::Hydro(HydroEvent::Test),
                    Dispatched::Dose(DoseEvent::Test),
                ]
            }
            HydroEvent::ValveToggle | HydroEvent::PumpToggle => {
                self.hydro.handle(event, now);
                vec![Dispatched::Hydro(event)]
            }
            other => {
                tracing::debug!(event = %other, "not a UI event; ignored");
                Vec::new()
            }
        }
    }

    /// Apply new user settings to both machines and the level monitor.
    pub fn update_settings(&mut self, settings: Settings) {
        let hole = self.level.hole_depth_cm();
        let threshold = if settings.overflow_height_cm.is_finite() {
            settings.overflow_height_cm.clamp(0.0, hole)
        } else {
            self.level.overflow_height_cm()
        };
        if threshold != settings.overflow_height_cm {
            tracing::warn!(
                from = settings.overflow_height_cm,
                to = threshold,
                "overflow threshold clamped"
            );
        }
        self.level.set_overflow_height_cm(threshold);
        self.hydro.update_settings(settings.hydro);
        self.conditioner.update_settings(settings.dose);
        self.cfg.settings = Settings {
            hydro: *self.hydro.settings(),
            dose: *self.conditioner.settings(),
            overflow_height_cm: threshold,
        };
    }

    /// Re-discretize every filter for a new sampling rate.
    pub fn set_sample_rate(&mut self, sample_hz: f64) -> crate::error::Result<()> {
        self.filters.recalc_all(sample_hz)?;
        self.cfg.filter.sample_rate_hz = sample_hz;
        self.sample_timer
            .rearm_interval(crate::util::period(sample_hz));
        Ok(())
    }

    pub fn status_lines(&self) -> Vec<String> {
        let now = self.clock.now();
        status::render(&StatusInput {
            phase_index: self.hydro.phase_index(),
            phase_count: self.hydro.table().len(),
            entry: self.hydro.current_entry(),
            remaining: self.hydro.remaining(now),
            hydro_safety: self.hydro.safety(),
            dose_state: self.conditioner.state(now),
            sensors: &self.last,
            testing: self.hydro.is_testing(),
        })
    }

    /// Turn every output off and return the snapshot to persist.
    pub fn shutdown(&mut self) -> CycleSnapshot {
        let now = self.clock.now();
        let snap = self.hydro.snapshot(now);
        self.hydro.shutdown();
        self.conditioner.shutdown();
        tracing::info!(
            phase = snap.phase_index,
            remaining_s = snap.remaining_secs,
            "controller shut down"
        );
        snap
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        self.hydro.snapshot(self.clock.now())
    }

    pub fn settings(&self) -> &Settings {
        &self.cfg.settings
    }

    pub fn config(&self) -> &ControllerCfg {
        &self.cfg
    }

    pub fn last_sample(&self) -> &SensorSnapshot {
        &self.last
    }

    pub fn is_warming_up(&self) -> bool {
        self.samples_taken < self.warmup_samples
    }

    pub fn overflow_latched(&self) -> bool {
        self.latch.is_active()
    }

    pub fn hydro(&self) -> &HydroMachine<H> {
        &self.hydro
    }

    pub fn conditioner(&self) -> &Conditioner<D> {
        &self.conditioner
    }

    pub fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    pub fn ph_probe(&self) -> &PhProbe {
        &self.ph_probe
    }

    pub fn ec_probe(&self) -> &EcProbe {
        &self.ec_probe
    }

    /// Time until the next scheduled sample.
    pub fn next_sample_in(&self) -> Duration {
        self.sample_timer
            .remaining(self.clock.now())
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(temp_cutoff_hz: f64) -> FilterBank {
        let lp = |cutoff| LowPassFilter::new(cutoff, 50.0, 2).unwrap();
        FilterBank {
            sonar: lp(7.0),
            ph: lp(5.0),
            ec: lp(5.0),
            temp: lp(temp_cutoff_hz),
        }
    }

    #[test]
    fn failed_rate_change_leaves_every_filter_alone() {
        let mut b = bank(9.0);
        // Nyquist 8 Hz: only the temperature cutoff is out of range.
        assert!(b.recalc_all(16.0).is_err());
        for f in [&b.sonar, &b.ph, &b.ec, &b.temp] {
            assert_eq!(f.sample_hz(), 50.0);
        }

        assert!(b.recalc_all(20.0).is_ok());
        for f in [&b.sonar, &b.ph, &b.ec, &b.temp] {
            assert_eq!(f.sample_hz(), 20.0);
        }
        assert_eq!(b.temp.cutoff_hz(), 9.0);
    }
}
