//! Water level from the sonar and the overflow latch.

/// Depth of the sonar mounting hole above the reservoir floor, 35 in.
pub const HOLE_DEPTH_CM: f64 = 35.0 * 2.54;

/// Water height in cm for a sonar `distance`, clamped to `[0, hole_depth]`.
#[inline]
pub fn water_height(distance_cm: f64, hole_depth_cm: f64) -> f64 {
    (hole_depth_cm - distance_cm).clamp(0.0, hole_depth_cm)
}

#[inline]
pub fn is_overflowing(height_cm: f64, threshold_cm: f64) -> bool {
    height_cm >= threshold_cm
}

/// One assessed level sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    pub height_cm: f64,
    pub overflowing: bool,
    /// The distance read failed; `overflowing` is forced on.
    pub read_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelMonitor {
    hole_depth_cm: f64,
    overflow_height_cm: f64,
}

impl Default for LevelMonitor {
    fn default() -> Self {
        Self::new(HOLE_DEPTH_CM, 16.0)
    }
}

impl LevelMonitor {
    pub fn new(hole_depth_cm: f64, overflow_height_cm: f64) -> Self {
        Self {
            hole_depth_cm,
            overflow_height_cm,
        }
    }

    pub fn overflow_height_cm(&self) -> f64 {
        self.overflow_height_cm
    }

    pub fn set_overflow_height_cm(&mut self, cm: f64) {
        self.overflow_height_cm = cm;
    }

    pub fn hole_depth_cm(&self) -> f64 {
        self.hole_depth_cm
    }

    /// Assess a filtered distance. A failed read always reports overflow.
    pub fn assess(&self, filtered_distance_cm: f64, read_failed: bool) -> LevelReading {
        let height_cm = water_height(filtered_distance_cm, self.hole_depth_cm);
        LevelReading {
            height_cm,
            overflowing: read_failed || is_overflowing(height_cm, self.overflow_height_cm),
            read_failed,
        }
    }
}

/// Edge produced by [`OverflowLatch::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelEdge {
    Overflow,
    NoOverflow,
}

/// Turns the per-sample overflow boolean into edge events.
///
/// `Overflow` fires once on the rising edge. `NoOverflow` fires only after
/// `clear_confirmations` consecutive clear samples, so a single noisy dip
/// does not release the pause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowLatch {
    active: bool,
    clear_streak: u32,
    clear_confirmations: u32,
}

impl Default for OverflowLatch {
    fn default() -> Self {
        Self::new(2)
    }
}

impl OverflowLatch {
    pub fn new(clear_confirmations: u32) -> Self {
        Self {
            active: false,
            clear_streak: 0,
            clear_confirmations: clear_confirmations.max(1),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn update(&mut self, overflowing: bool) -> Option<LevelEdge> {
        if overflowing {
            self.clear_streak = 0;
            if self.active {
                return None;
            }
            self.active = true;
            return Some(LevelEdge::Overflow);
        }
        if !self.active {
            return None;
        }
        self.clear_streak += 1;
        if self.clear_streak >= self.clear_confirmations {
            self.active = false;
            self.clear_streak = 0;
            Some(LevelEdge::NoOverflow)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_is_clamped() {
        assert_eq!(water_height(100.0, HOLE_DEPTH_CM), 0.0);
        assert_eq!(water_height(-5.0, HOLE_DEPTH_CM), HOLE_DEPTH_CM);
        assert!((water_height(80.0, HOLE_DEPTH_CM) - 8.9).abs() < 1e-9);
    }

    #[test]
    fn failed_read_is_overflow() {
        let m = LevelMonitor::default();
        let r = m.assess(80.0, true);
        assert!(r.overflowing);
        assert!(!m.assess(80.0, false).overflowing);
    }

    #[test]
    fn latch_needs_two_clear_samples() {
        let mut l = OverflowLatch::default();
        assert_eq!(l.update(true), Some(LevelEdge::Overflow));
        assert_eq!(l.update(true), None);
        assert_eq!(l.update(false), None);
        assert_eq!(l.update(true), None);
        assert_eq!(l.update(false), None);
        assert_eq!(l.update(false), Some(LevelEdge::NoOverflow));
        assert_eq!(l.update(false), None);
    }
}
