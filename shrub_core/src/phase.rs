//! Flood/drain phase table.
//!
//! One full cycle is two mirrored sub-cycles of
//! `Fill -> Hold -> DrainFirst -> DrainSecond -> Settle`. Sub-cycle A drains
//! through the top valve first, sub-cycle B through the bottom valve first,
//! so both valves see the same wear.

use std::fmt;
use std::time::Duration;

use shrub_traits::Valve;

use crate::timer::Timer;
use crate::util::duration_from_secs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Channel pump running.
    Fill,
    /// Pump off, channel flooded.
    Hold,
    DrainFirst,
    DrainSecond,
    /// Everything off until the next fill.
    Settle,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Fill => "fill",
            Stage::Hold => "hold",
            Stage::DrainFirst => "drain-1",
            Stage::DrainSecond => "drain-2",
            Stage::Settle => "settle",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubCycle {
    A,
    B,
}

impl SubCycle {
    /// Valve opened in `DrainFirst`.
    pub fn first_valve(self) -> Valve {
        match self {
            SubCycle::A => Valve::Top,
            SubCycle::B => Valve::Bottom,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseEntry {
    pub stage: Stage,
    pub sub_cycle: SubCycle,
    pub pump_on: bool,
    pub top_valve: bool,
    pub bottom_valve: bool,
    pub duration: Duration,
}

impl PhaseEntry {
    pub fn valve(&self, which: Valve) -> bool {
        match which {
            Valve::Top => self.top_valve,
            Valve::Bottom => self.bottom_valve,
        }
    }
}

/// Timing inputs for the phase table, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HydroSettings {
    /// Fill plus hold.
    pub flood_secs: f64,
    pub active_pump_secs: f64,
    /// Both drain stages plus settle.
    pub drain_secs: f64,
    /// Each valve stays open `active_pump_secs * valve_drain_factor`.
    pub valve_drain_factor: f64,
}

impl Default for HydroSettings {
    fn default() -> Self {
        Self {
            flood_secs: 19.0 * 60.0,
            active_pump_secs: 120.0,
            drain_secs: 6.0 * 60.0,
            valve_drain_factor: 1.0,
        }
    }
}

/// A setting that had to be pulled into range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clamped {
    pub field: &'static str,
    pub from: f64,
    pub to: f64,
}

impl HydroSettings {
    /// Build from the `[flood, active_pump, drain]` triple used by the menu
    /// and settings file.
    pub fn from_ptimes(ptimes: [f64; 3]) -> Self {
        Self {
            flood_secs: ptimes[0],
            active_pump_secs: ptimes[1],
            drain_secs: ptimes[2],
            ..Self::default()
        }
    }

    pub fn ptimes(&self) -> [f64; 3] {
        [self.flood_secs, self.active_pump_secs, self.drain_secs]
    }

    pub fn valve_drain_secs(&self) -> f64 {
        (self.active_pump_secs * self.valve_drain_factor).round()
    }

    /// Copy with every negative or non-finite field set to zero and every
    /// time longer than [`Timer::MAX_INTERVAL`] cut to it, plus the list of
    /// fields that changed.
    pub fn sanitized(&self) -> (Self, Vec<Clamped>) {
        let max_secs = Timer::MAX_INTERVAL.as_secs_f64();
        let mut out = *self;
        let mut clamped = Vec::new();
        for (field, value, upper) in [
            ("flood_secs", &mut out.flood_secs, max_secs),
            ("active_pump_secs", &mut out.active_pump_secs, max_secs),
            ("drain_secs", &mut out.drain_secs, max_secs),
            ("valve_drain_factor", &mut out.valve_drain_factor, f64::MAX),
        ] {
            let to = if !value.is_finite() || *value < 0.0 {
                0.0
            } else {
                value.min(upper)
            };
            if to != *value {
                clamped.push(Clamped {
                    field,
                    from: *value,
                    to,
                });
                *value = to;
            }
        }
        (out, clamped)
    }
}


/// The fixed ten-entry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTable {
    entries: Vec<PhaseEntry>,
}

impl PhaseTable {
    pub const LEN: usize = 10;

    pub fn build(settings: &HydroSettings) -> Self {
        let active = settings.active_pump_secs;
        let valve_drain = settings.valve_drain_secs();
        let hold = settings.flood_secs - active;
        let settle = settings.drain_secs - 2.0 * valve_drain;

        let mut entries = Vec::with_capacity(Self::LEN);
        for sub_cycle in [SubCycle::A, SubCycle::B] {
            let first = sub_cycle.first_valve();
            let drain = |stage, which: Valve| PhaseEntry {
                stage,
                sub_cycle,
                pump_on: false,
                top_valve: which == Valve::Top,
                bottom_valve: which == Valve::Bottom,
                duration: duration_from_secs(valve_drain),
            };
            let second = match first {
                Valve::Top => Valve::Bottom,
                Valve::Bottom => Valve::Top,
            };
            let idle = |stage, pump_on, d| PhaseEntry {
                stage,
                sub_cycle,
                pump_on,
                top_valve: false,
                bottom_valve: false,
                duration: duration_from_secs(d),
            };

            entries.push(idle(Stage::Fill, true, active));
            entries.push(idle(Stage::Hold, false, hold));
            entries.push(drain(Stage::DrainFirst, first));
            entries.push(drain(Stage::DrainSecond, second));
            entries.push(idle(Stage::Settle, false, settle));
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PhaseEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[PhaseEntry] {
        &self.entries
    }

    /// Sum of all phase durations.
    pub fn cycle_duration(&self) -> Duration {
        self.entries.iter().map(|e| e.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_shape() {
        let t = PhaseTable::build(&HydroSettings::default());
        assert_eq!(t.len(), PhaseTable::LEN);
        assert_eq!(t.entries()[0].duration, Duration::from_secs(120));
        assert_eq!(t.entries()[1].duration, Duration::from_secs(1020));
        assert_eq!(t.entries()[4].duration, Duration::from_secs(120));
        assert_eq!(t.cycle_duration(), Duration::from_secs(2 * (1140 + 360)));
    }

    #[test]
    fn sub_cycles_mirror_valve_order() {
        let t = PhaseTable::build(&HydroSettings::default());
        let e = t.entries();
        assert!(e[2].top_valve && !e[2].bottom_valve);
        assert!(e[3].bottom_valve && !e[3].top_valve);
        assert!(e[7].bottom_valve && !e[7].top_valve);
        assert!(e[8].top_valve && !e[8].bottom_valve);
        assert!(e.iter().filter(|p| p.pump_on).count() == 2);
    }

    #[test]
    fn sanitize_reports_each_clamp() {
        let s = HydroSettings {
            flood_secs: -1.0,
            drain_secs: f64::NAN,
            ..HydroSettings::default()
        };
        let (clean, clamped) = s.sanitized();
        assert_eq!(clean.flood_secs, 0.0);
        assert_eq!(clean.drain_secs, 0.0);
        let fields: Vec<_> = clamped.iter().map(|c| c.field).collect();
        assert_eq!(fields, ["flood_secs", "drain_secs"]);
    }

    #[test]
    fn huge_times_are_cut_to_the_timer_limit() {
        let s = HydroSettings::from_ptimes([1e30, 1e30, 600.0]);
        let (clean, clamped) = s.sanitized();
        let week = Timer::MAX_INTERVAL.as_secs_f64();
        assert_eq!(clean.flood_secs, week);
        assert_eq!(clean.active_pump_secs, week);
        assert_eq!(clamped.len(), 2);

        // Unsanitized input still yields bounded phases.
        let t = PhaseTable::build(&s);
        assert!(t.entries().iter().all(|e| e.duration <= Timer::MAX_INTERVAL));
    }
}
