//! Pause bookkeeping shared by both state machines.

/// Why outputs are forced off.
///
/// Overflow and the user override pause independently; leaving one never
/// clears a pause the other still holds, and the user override always wins
/// over overflow recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafetyFlags {
    pub pump_paused: bool,
    pub valve_paused: bool,
    pub overflow_active: bool,
    pub user_override_active: bool,
}

impl SafetyFlags {
    pub fn is_paused(&self) -> bool {
        self.pump_paused || self.valve_paused
    }

    fn pause(&mut self) {
        self.pump_paused = true;
        self.valve_paused = true;
    }

    fn resume(&mut self) {
        self.pump_paused = false;
        self.valve_paused = false;
    }

    pub fn on_overflow(&mut self) {
        self.overflow_active = true;
        self.pause();
    }

    /// Returns `false` when ignored because no overflow was active.
    pub fn on_no_overflow(&mut self) -> bool {
        if !self.overflow_active {
            return false;
        }
        self.overflow_active = false;
        if !self.user_override_active {
            self.resume();
        }
        true
    }

    /// Flip the user override; returns the new override state.
    pub fn on_user_toggle(&mut self) -> bool {
        self.user_override_active = !self.user_override_active;
        if self.user_override_active {
            self.pause();
        } else if !self.overflow_active {
            self.resume();
        }
        self.user_override_active
    }
}
