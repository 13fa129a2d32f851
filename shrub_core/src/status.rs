//! Latest filtered sensor values and the operator status lines.

use std::time::Duration;

use crate::conditioner::DoseState;
use crate::phase::{PhaseEntry, SubCycle};
use crate::safety::SafetyFlags;
use crate::util::format_hms;

/// Which sensors failed on the most recent sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorFaults {
    pub sonar: bool,
    pub ph: bool,
    pub ec: bool,
    pub temp: bool,
}

impl SensorFaults {
    pub fn any(&self) -> bool {
        self.sonar || self.ph || self.ec || self.temp
    }

    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.sonar, "sonar"),
            (self.ph, "pH"),
            (self.ec, "EC"),
            (self.temp, "temp"),
        ]
        .into_iter()
        .filter_map(|(failed, name)| failed.then_some(name))
        .collect()
    }
}

/// Filtered values from the most recent sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorSnapshot {
    pub distance_cm: f64,
    pub height_cm: f64,
    pub ph: f64,
    /// mS/cm, temperature compensated.
    pub ec: f64,
    pub temp_c: f64,
    pub overflowing: bool,
    pub faults: SensorFaults,
}

pub(crate) struct StatusInput<'a> {
    pub phase_index: usize,
    pub phase_count: usize,
    pub entry: &'a PhaseEntry,
    pub remaining: Option<Duration>,
    pub hydro_safety: &'a SafetyFlags,
    pub dose_state: DoseState,
    pub sensors: &'a SensorSnapshot,
    pub testing: bool,
}

fn pause_reason(s: &SafetyFlags) -> Option<&'static str> {
    match (s.overflow_active, s.user_override_active) {
        (true, true) => Some("overflow+user"),
        (true, false) => Some("overflow"),
        (false, true) => Some("user"),
        (false, false) if s.is_paused() => Some("paused"),
        _ => None,
    }
}

pub(crate) fn render(input: &StatusInput<'_>) -> Vec<String> {
    let sub = match input.entry.sub_cycle {
        SubCycle::A => 'A',
        SubCycle::B => 'B',
    };
    let left = input
        .remaining
        .map_or_else(|| "--:--:--".to_string(), format_hms);
    let mut lines = vec![format!(
        "Phase {}/{} {} ({}) {} left",
        input.phase_index + 1,
        input.phase_count,
        input.entry.stage,
        sub,
        left
    )];

    if let Some(why) = pause_reason(input.hydro_safety) {
        lines.push(format!("PAUSED ({why})"));
    } else if input.testing {
        lines.push("TESTING outputs".to_string());
    }

    let s = input.sensors;
    lines.push(if s.faults.sonar {
        "Level: sonar fault".to_string()
    } else {
        format!(
            "Level {:.1} cm{}",
            s.height_cm,
            if s.overflowing { " OVERFLOW" } else { "" }
        )
    });
    lines.push(format!("pH {:.2}  EC {:.2} mS/cm  T {:.1} C", s.ph, s.ec, s.temp_c));
    lines.push(format!("Dosing: {}", input.dose_state));
    if s.faults.any() {
        lines.push(format!("Sensor fault: {}", s.faults.names().join(", ")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_names_in_fixed_order() {
        let f = SensorFaults {
            sonar: true,
            temp: true,
            ..SensorFaults::default()
        };
        assert_eq!(f.names(), ["sonar", "temp"]);
        assert!(!SensorFaults::default().any());
    }

    #[test]
    fn pause_reason_prefers_both() {
        let mut s = SafetyFlags::default();
        s.on_overflow();
        s.on_user_toggle();
        assert_eq!(pause_reason(&s), Some("overflow+user"));
    }
}
