//! Dosing state machine for the acid, base, and nutrient pumps.
//!
//! A range condition starts a short pulse on one pump and a settle period
//! during which no further dose is allowed. Outside of `TEST` at most one
//! pump is ever on.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use shrub_traits::{DoseActuators, DosePump};

use crate::error::UnknownEvent;
use crate::hw_error::map_hw_error;
use crate::hydro::HydroView;
use crate::safety::SafetyFlags;
use crate::timer::{Timer, TimerPoll};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCondition {
    HighPh,
    LowPh,
    LowEc,
}

impl RangeCondition {
    pub fn name(self) -> &'static str {
        match self {
            RangeCondition::HighPh => "HIGH_PH",
            RangeCondition::LowPh => "LOW_PH",
            RangeCondition::LowEc => "LOW_EC",
        }
    }

    /// Pump that answers this condition.
    pub fn pump(self) -> DosePump {
        match self {
            RangeCondition::LowPh => DosePump::Acid,
            RangeCondition::HighPh => DosePump::Base,
            RangeCondition::LowEc => DosePump::Nutrient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseThresholds {
    pub ph_high: f64,
    pub ph_low: f64,
    /// Shown on the status screen only; there is no dilution pump.
    pub ec_high: f64,
    pub ec_low: f64,
}

impl Default for DoseThresholds {
    fn default() -> Self {
        Self {
            ph_high: 9.0,
            ph_low: 4.0,
            ec_high: 2.0,
            ec_low: 0.01,
        }
    }
}

/// At most one condition, checked in priority order high pH, low pH, low EC.
pub fn check_range(ph: f64, ec: f64, t: &DoseThresholds) -> Option<RangeCondition> {
    if ph > t.ph_high {
        Some(RangeCondition::HighPh)
    } else if ph < t.ph_low {
        Some(RangeCondition::LowPh)
    } else if ec < t.ec_low {
        Some(RangeCondition::LowEc)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseEvent {
    Range(RangeCondition),
    /// Dose pulse finished.
    OnTimer,
    Overflow,
    NoOverflow,
    UserToggle,
    Test,
    TestDone,
}

impl DoseEvent {
    pub fn name(self) -> &'static str {
        match self {
            DoseEvent::Range(c) => c.name(),
            DoseEvent::OnTimer => "ON_TIMER",
            DoseEvent::Overflow => "OVERFLOW",
            DoseEvent::NoOverflow => "NO_OVERFLOW",
            DoseEvent::UserToggle => "USER_TOGGLE",
            DoseEvent::Test => "TEST",
            DoseEvent::TestDone => "TEST_DONE",
        }
    }
}

impl fmt::Display for DoseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DoseEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH_PH" => Ok(DoseEvent::Range(RangeCondition::HighPh)),
            "LOW_PH" => Ok(DoseEvent::Range(RangeCondition::LowPh)),
            "LOW_EC" => Ok(DoseEvent::Range(RangeCondition::LowEc)),
            "ON_TIMER" => Ok(DoseEvent::OnTimer),
            "OVERFLOW" => Ok(DoseEvent::Overflow),
            "NO_OVERFLOW" => Ok(DoseEvent::NoOverflow),
            "USER_TOGGLE" => Ok(DoseEvent::UserToggle),
            "TEST" => Ok(DoseEvent::Test),
            "TEST_DONE" => Ok(DoseEvent::TestDone),
            _ => Err(UnknownEvent(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseSettings {
    pub thresholds: DoseThresholds,
    pub dose_duration: Duration,
    pub settle_duration: Duration,
    pub test_duration: Duration,
}

impl Default for DoseSettings {
    fn default() -> Self {
        Self {
            thresholds: DoseThresholds::default(),
            dose_duration: Duration::from_secs(1),
            settle_duration: Duration::from_secs(300),
            test_duration: Duration::from_secs(6),
        }
    }
}

/// What the conditioner is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoseState {
    Idle,
    Dosing(DosePump),
    Settling,
    Testing,
    Paused,
}

impl fmt::Display for DoseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseState::Idle => f.write_str("idle"),
            DoseState::Dosing(p) => write!(f, "dosing {}", p.name()),
            DoseState::Settling => f.write_str("settling"),
            DoseState::Testing => f.write_str("testing"),
            DoseState::Paused => f.write_str("paused"),
        }
    }
}

fn clamp_thresholds(t: DoseThresholds) -> DoseThresholds {
    let mut out = t;
    for (field, value, lo, hi) in [
        ("ph_high", &mut out.ph_high, 0.0, 14.0),
        ("ph_low", &mut out.ph_low, 0.0, 14.0),
        ("ec_high", &mut out.ec_high, 0.0, f64::MAX),
        ("ec_low", &mut out.ec_low, 0.0, f64::MAX),
    ] {
        let v = *value;
        let clean = if v.is_finite() { v.clamp(lo, hi) } else { lo };
        if clean != v {
            tracing::warn!(field, from = v, to = clean, "dose threshold clamped");
            *value = clean;
        }
    }
    if out.ph_low > out.ph_high {
        tracing::warn!(
            ph_low = out.ph_low,
            ph_high = out.ph_high,
            "pH thresholds inverted; swapping"
        );
        std::mem::swap(&mut out.ph_low, &mut out.ph_high);
    }
    out
}

pub struct Conditioner<D: DoseActuators> {
    actuators: D,
    settings: DoseSettings,
    dose_timer: Timer,
    settle_timer: Timer,
    test_timer: Timer,
    running: Option<DosePump>,
    testing: bool,
    safety: SafetyFlags,
}

impl<D: DoseActuators> fmt::Debug for Conditioner<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conditioner")
            .field("running", &self.running)
            .field("testing", &self.testing)
            .field("safety", &self.safety)
            .finish()
    }
}

impl<D: DoseActuators> Conditioner<D> {
    pub fn new(actuators: D, settings: DoseSettings) -> Self {
        let settings = DoseSettings {
            thresholds: clamp_thresholds(settings.thresholds),
            ..settings
        };
        Self {
            actuators,
            dose_timer: Timer::new(settings.dose_duration),
            settle_timer: Timer::new(settings.settle_duration),
            test_timer: Timer::new(settings.test_duration),
            settings,
            running: None,
            testing: false,
            safety: SafetyFlags::default(),
        }
    }

    /// Make sure every pump starts off.
    pub fn begin(&mut self) {
        self.all_off();
    }

    /// Poll timers, then act on the latest filtered pH/EC when given.
    ///
    /// `reading` is `None` on a tick whose pH or EC read failed.
    pub fn tick(
        &mut self,
        now: Instant,
        reading: Option<(f64, f64)>,
        hydro: HydroView,
    ) -> Vec<DoseEvent> {
        let mut fired = Vec::new();
        if self.dose_timer.poll(now).is_due() {
            self.handle(DoseEvent::OnTimer, now);
            fired.push(DoseEvent::OnTimer);
        }
        if self.test_timer.poll(now).is_due() {
            self.handle(DoseEvent::TestDone, now);
            fired.push(DoseEvent::TestDone);
        }
        if let Some((ph, ec)) = reading
            && let Some(cond) = check_range(ph, ec, &self.settings.thresholds)
            && self.can_dose(now)
        {
            tracing::info!(
                condition = cond.name(),
                ph,
                ec,
                phase = hydro.phase_index,
                stage = %hydro.stage,
                hydro_paused = hydro.paused,
                "reservoir out of range"
            );
            let event = DoseEvent::Range(cond);
            self.handle(event, now);
            fired.push(event);
        }
        fired
    }

    /// Settle elapsed or never started, not paused, nothing running.
    pub fn can_dose(&self, now: Instant) -> bool {
        !self.safety.is_paused()
            && !self.testing
            && self.running.is_none()
            && self.settle_timer.poll_sticky(now) != TimerPoll::Pending
    }

    pub fn handle(&mut self, event: DoseEvent, now: Instant) {
        match event {
            DoseEvent::Range(cond) => {
                if !self.can_dose(now) {
                    tracing::debug!(condition = cond.name(), "dose suppressed");
                    return;
                }
                let pump = cond.pump();
                self.set(pump, true);
                self.running = Some(pump);
                self.dose_timer.arm(now, self.settings.dose_duration);
                self.settle_timer.arm(now, self.settings.settle_duration);
                tracing::info!(
                    pump = pump.name(),
                    dose_s = self.settings.dose_duration.as_secs_f64(),
                    settle_s = self.settings.settle_duration.as_secs_f64(),
                    "dose started"
                );
            }
            DoseEvent::OnTimer => {
                self.all_off();
                self.running = None;
                tracing::debug!("dose pulse finished");
            }
            DoseEvent::Overflow => {
                self.safety.on_overflow();
                self.abort("overflow");
            }
            DoseEvent::NoOverflow => {
                if !self.safety.on_no_overflow() {
                    tracing::debug!("NO_OVERFLOW without active overflow ignored");
                }
            }
            DoseEvent::UserToggle => {
                if self.safety.on_user_toggle() {
                    self.abort("user override");
                }
            }
            DoseEvent::Test => {
                if self.safety.is_paused() {
                    tracing::info!("dose pump test ignored while paused");
                    return;
                }
                self.dose_timer.disarm();
                self.running = None;
                for pump in DosePump::ALL {
                    self.set(pump, true);
                }
                self.testing = true;
                self.test_timer.arm(now, self.settings.test_duration);
                tracing::info!(
                    duration_s = self.settings.test_duration.as_secs_f64(),
                    "dose pump test started"
                );
            }
            DoseEvent::TestDone => {
                self.all_off();
                self.testing = false;
                self.test_timer.disarm();
                tracing::info!("dose pump test finished");
            }
        }
    }

    /// Replace thresholds and durations. Running timers keep their elapsed
    /// time.
    pub fn update_settings(&mut self, settings: DoseSettings) {
        self.settings = DoseSettings {
            thresholds: clamp_thresholds(settings.thresholds),
            ..settings
        };
        self.dose_timer.rearm_interval(self.settings.dose_duration);
        self.settle_timer.rearm_interval(self.settings.settle_duration);
        self.test_timer.rearm_interval(self.settings.test_duration);
        tracing::info!(
            ph_high = self.settings.thresholds.ph_high,
            ph_low = self.settings.thresholds.ph_low,
            ec_low = self.settings.thresholds.ec_low,
            "dose settings updated"
        );
    }

    pub fn shutdown(&mut self) {
        self.dose_timer.disarm();
        self.test_timer.disarm();
        self.running = None;
        self.testing = false;
        self.all_off();
    }

    pub fn state(&self, now: Instant) -> DoseState {
        if self.safety.is_paused() {
            DoseState::Paused
        } else if self.testing {
            DoseState::Testing
        } else if let Some(p) = self.running {
            DoseState::Dosing(p)
        } else if self.settle_timer.poll_sticky(now) == TimerPoll::Pending {
            DoseState::Settling
        } else {
            DoseState::Idle
        }
    }

    pub fn running(&self) -> Option<DosePump> {
        self.running
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }

    pub fn settle_remaining(&self, now: Instant) -> Option<Duration> {
        self.settle_timer.remaining(now)
    }

    pub fn settings(&self) -> &DoseSettings {
        &self.settings
    }

    pub fn thresholds(&self) -> &DoseThresholds {
        &self.settings.thresholds
    }

    pub fn safety(&self) -> &SafetyFlags {
        &self.safety
    }

    pub fn actuators(&self) -> &D {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut D {
        &mut self.actuators
    }

    // The settle timer keeps running so a resumed machine still waits.
    fn abort(&mut self, why: &'static str) {
        if self.running.is_some() || self.testing {
            tracing::warn!(reason = why, "dose aborted");
        }
        self.dose_timer.disarm();
        self.test_timer.disarm();
        self.running = None;
        self.testing = false;
        self.all_off();
    }

    fn all_off(&mut self) {
        for pump in DosePump::ALL {
            self.set(pump, false);
        }
    }

    fn set(&mut self, pump: DosePump, on: bool) {
        if let Err(e) = self.actuators.set_dose_pump(pump, on) {
            tracing::warn!(error = %map_hw_error(&*e), pump = pump.name(), on, "set_dose_pump failed");
        }
    }
}
