//! Flood/drain state machine: channel pump, UV lamp, and both drain valves.
//!
//! The schedule keeps advancing while paused; only the outputs are held off.
//! Output precedence is pause > test > manual override > phase table.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use shrub_traits::{HydroActuators, Valve};

use crate::error::UnknownEvent;
use crate::hw_error::map_hw_error;
use crate::phase::{HydroSettings, PhaseEntry, PhaseTable, Stage};
use crate::safety::SafetyFlags;
use crate::timer::Timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydroEvent {
    /// Phase timer expired.
    Time,
    Overflow,
    NoOverflow,
    UserToggle,
    ValveToggle,
    PumpToggle,
    Test,
    /// Test timer expired.
    TestDone,
}

impl HydroEvent {
    pub fn name(self) -> &'static str {
        match self {
            HydroEvent::Time => "TIME",
            HydroEvent::Overflow => "OVERFLOW",
            HydroEvent::NoOverflow => "NO_OVERFLOW",
            HydroEvent::UserToggle => "USER_TOGGLE",
            HydroEvent::ValveToggle => "VALVE_TOGGLE",
            HydroEvent::PumpToggle => "PUMP_TOGGLE",
            HydroEvent::Test => "TEST",
            HydroEvent::TestDone => "TEST_DONE",
        }
    }
}

impl fmt::Display for HydroEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HydroEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TIME" => Ok(HydroEvent::Time),
            "OVERFLOW" => Ok(HydroEvent::Overflow),
            "NO_OVERFLOW" => Ok(HydroEvent::NoOverflow),
            "USER_TOGGLE" => Ok(HydroEvent::UserToggle),
            "VALVE_TOGGLE" => Ok(HydroEvent::ValveToggle),
            "PUMP_TOGGLE" => Ok(HydroEvent::PumpToggle),
            "TEST" => Ok(HydroEvent::Test),
            "TEST_DONE" => Ok(HydroEvent::TestDone),
            _ => Err(UnknownEvent(s.to_string())),
        }
    }
}

/// Drive levels for the hydro outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydroConfig {
    /// Channel pump power while a phase calls for it, percent.
    pub pump_power: u8,
    pub test_power: u8,
    pub test_duration: Duration,
}

impl Default for HydroConfig {
    fn default() -> Self {
        Self {
            pump_power: 30,
            test_power: 60,
            test_duration: Duration::from_secs(6),
        }
    }
}

/// What the machine last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HydroOutputs {
    pub pump_percent: u8,
    pub top_valve: bool,
    pub bottom_valve: bool,
    pub lamp: bool,
}

impl HydroOutputs {
    pub const OFF: Self = Self {
        pump_percent: 0,
        top_valve: false,
        bottom_valve: false,
        lamp: false,
    };
}

/// Durable part of the cycle: where in the table we are and how long is left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleSnapshot {
    pub phase_index: usize,
    pub remaining_secs: f64,
}

/// Read-only summary of the hydro machine for other components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydroView {
    pub phase_index: usize,
    pub stage: Stage,
    pub paused: bool,
}

pub struct HydroMachine<A: HydroActuators> {
    actuators: A,
    settings: HydroSettings,
    table: PhaseTable,
    config: HydroConfig,
    phase_index: usize,
    phase_timer: Timer,
    test_timer: Timer,
    testing: bool,
    pump_override: Option<bool>,
    valve_override: Option<bool>,
    safety: SafetyFlags,
    outputs: HydroOutputs,
}

impl<A: HydroActuators> fmt::Debug for HydroMachine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HydroMachine")
            .field("phase_index", &self.phase_index)
            .field("stage", &self.current_entry().stage)
            .field("safety", &self.safety)
            .field("outputs", &self.outputs)
            .finish()
    }
}

fn sanitize(settings: &HydroSettings) -> HydroSettings {
    let (clean, clamped) = settings.sanitized();
    for c in clamped {
        tracing::warn!(field = c.field, from = c.from, to = c.to, "hydro setting clamped");
    }
    clean
}

impl<A: HydroActuators> HydroMachine<A> {
    pub fn new(actuators: A, settings: HydroSettings, config: HydroConfig) -> Self {
        let settings = sanitize(&settings);
        let table = PhaseTable::build(&settings);
        let first = table.entries().first().map_or(Duration::ZERO, |e| e.duration);
        Self {
            actuators,
            settings,
            table,
            config,
            phase_index: 0,
            phase_timer: Timer::new(first),
            test_timer: Timer::new(config.test_duration),
            testing: false,
            pump_override: None,
            valve_override: None,
            safety: SafetyFlags::default(),
            outputs: HydroOutputs::OFF,
        }
    }

    /// Arm the current phase from the top and drive its outputs.
    pub fn begin(&mut self, now: Instant) {
        let d = self.current_entry().duration;
        self.phase_timer.arm(now, d);
        tracing::info!(
            phase = self.phase_index,
            stage = %self.current_entry().stage,
            duration_s = d.as_secs_f64(),
            "hydro cycle started"
        );
        self.apply();
    }

    /// Resume a persisted cycle. An index outside the table restarts at 0.
    pub fn restore(&mut self, phase_index: usize, remaining: Duration, now: Instant) {
        if phase_index < self.table.len() {
            self.phase_index = phase_index;
        } else {
            tracing::warn!(
                phase_index,
                len = self.table.len(),
                "stored phase index out of range; starting from phase 0"
            );
            self.phase_index = 0;
        }
        let d = self.current_entry().duration;
        self.phase_timer.arm_remaining(now, d, remaining);
        tracing::info!(
            phase = self.phase_index,
            stage = %self.current_entry().stage,
            remaining_s = remaining.min(d).as_secs_f64(),
            "hydro cycle restored"
        );
        self.apply();
    }

    /// Poll the phase and test timers, handling whatever expired.
    pub fn tick(&mut self, now: Instant) -> Vec<HydroEvent> {
        let mut fired = Vec::new();
        if self.phase_timer.poll(now).is_due() {
            self.handle(HydroEvent::Time, now);
            fired.push(HydroEvent::Time);
        }
        if self.test_timer.poll(now).is_due() {
            self.handle(HydroEvent::TestDone, now);
            fired.push(HydroEvent::TestDone);
        }
        fired
    }

    pub fn handle(&mut self, event: HydroEvent, now: Instant) {
        match event {
            HydroEvent::Time => {
                self.phase_index = (self.phase_index + 1) % self.table.len();
                let entry = *self.current_entry();
                self.phase_timer.arm(now, entry.duration);
                tracing::info!(
                    phase = self.phase_index,
                    stage = %entry.stage,
                    duration_s = entry.duration.as_secs_f64(),
                    paused = self.safety.is_paused(),
                    "phase advanced"
                );
            }
            HydroEvent::Overflow => {
                self.safety.on_overflow();
                tracing::warn!("overflow: pump and valves paused");
            }
            HydroEvent::NoOverflow => {
                if !self.safety.on_no_overflow() {
                    tracing::debug!("NO_OVERFLOW without active overflow ignored");
                    return;
                }
                tracing::info!(
                    still_paused = self.safety.is_paused(),
                    "overflow cleared"
                );
            }
            HydroEvent::UserToggle => {
                let active = self.safety.on_user_toggle();
                tracing::info!(user_override = active, "hydro user override toggled");
            }
            HydroEvent::ValveToggle => {
                self.valve_override = toggle_override(self.valve_override);
                tracing::info!(valve_override = ?self.valve_override, "valve override toggled");
            }
            HydroEvent::PumpToggle => {
                self.pump_override = toggle_override(self.pump_override);
                tracing::info!(pump_override = ?self.pump_override, "pump override toggled");
            }
            HydroEvent::Test => {
                self.testing = true;
                self.test_timer.arm(now, self.config.test_duration);
                tracing::info!(
                    power = self.config.test_power,
                    duration_s = self.config.test_duration.as_secs_f64(),
                    "hydro output test started"
                );
            }
            HydroEvent::TestDone => {
                self.testing = false;
                self.test_timer.disarm();
                tracing::info!("hydro output test finished");
            }
        }
        self.apply();
    }

    /// Replace the timing settings. The phase index is kept and the running
    /// phase keeps its elapsed time.
    pub fn update_settings(&mut self, settings: HydroSettings) {
        self.settings = sanitize(&settings);
        self.table = PhaseTable::build(&self.settings);
        let d = self.current_entry().duration;
        self.phase_timer.rearm_interval(d);
        tracing::info!(
            flood_s = self.settings.flood_secs,
            active_pump_s = self.settings.active_pump_secs,
            drain_s = self.settings.drain_secs,
            phase = self.phase_index,
            "hydro settings updated"
        );
    }

    pub fn snapshot(&self, now: Instant) -> CycleSnapshot {
        CycleSnapshot {
            phase_index: self.phase_index,
            remaining_secs: self
                .phase_timer
                .remaining(now)
                .unwrap_or(Duration::ZERO)
                .as_secs_f64(),
        }
    }

    /// Force every output off. Timers are left alone so a snapshot taken
    /// afterwards still reflects the schedule.
    pub fn shutdown(&mut self) {
        self.write(HydroOutputs::OFF);
    }

    pub fn view(&self) -> HydroView {
        HydroView {
            phase_index: self.phase_index,
            stage: self.current_entry().stage,
            paused: self.safety.is_paused(),
        }
    }

    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    pub fn current_entry(&self) -> &PhaseEntry {
        &self.table.entries()[self.phase_index]
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.phase_timer.remaining(now)
    }

    pub fn table(&self) -> &PhaseTable {
        &self.table
    }

    pub fn settings(&self) -> &HydroSettings {
        &self.settings
    }

    pub fn safety(&self) -> &SafetyFlags {
        &self.safety
    }

    pub fn outputs(&self) -> HydroOutputs {
        self.outputs
    }

    pub fn is_testing(&self) -> bool {
        self.testing
    }

    pub fn pump_override(&self) -> Option<bool> {
        self.pump_override
    }

    pub fn valve_override(&self) -> Option<bool> {
        self.valve_override
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }

    fn desired_outputs(&self) -> HydroOutputs {
        let entry = self.current_entry();
        let mut out = if self.testing {
            HydroOutputs {
                pump_percent: self.config.test_power,
                top_valve: true,
                bottom_valve: true,
                lamp: false,
            }
        } else {
            let pump_on = self.pump_override.unwrap_or(entry.pump_on);
            let (top, bottom) = match self.valve_override {
                Some(open) => (open, open),
                None => (entry.valve(Valve::Top), entry.valve(Valve::Bottom)),
            };
            HydroOutputs {
                pump_percent: if pump_on { self.config.pump_power } else { 0 },
                top_valve: top,
                bottom_valve: bottom,
                lamp: false,
            }
        };
        if self.safety.pump_paused {
            out.pump_percent = 0;
        }
        if self.safety.valve_paused {
            out.top_valve = false;
            out.bottom_valve = false;
        }
        out.lamp = out.pump_percent > 0;
        out
    }

    fn apply(&mut self) {
        let desired = self.desired_outputs();
        self.write(desired);
    }

    fn write(&mut self, out: HydroOutputs) {
        if let Err(e) = self.actuators.set_pump(out.pump_percent.min(100)) {
            tracing::warn!(error = %map_hw_error(&*e), "set_pump failed");
        }
        if let Err(e) = self.actuators.set_valve(Valve::Top, out.top_valve) {
            tracing::warn!(error = %map_hw_error(&*e), valve = "top", "set_valve failed");
        }
        if let Err(e) = self.actuators.set_valve(Valve::Bottom, out.bottom_valve) {
            tracing::warn!(error = %map_hw_error(&*e), valve = "bottom", "set_valve failed");
        }
        if let Err(e) = self.actuators.set_lamp(out.lamp) {
            tracing::warn!(error = %map_hw_error(&*e), "set_lamp failed");
        }
        self.outputs = out;
    }
}

fn toggle_override(current: Option<bool>) -> Option<bool> {
    match current {
        None => Some(true),
        Some(_) => None,
    }
}
