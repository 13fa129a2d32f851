//! Non-blocking deadline timer.
//!
//! A `Timer` never sleeps. Its owner passes the current `Instant` in and asks
//! whether the deadline has passed. "Disarmed" is its own state, separate
//! from "not yet due": callers use it to mean "inactive on purpose".

use std::time::{Duration, Instant};

use crate::error::TimerError;

/// Result of polling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPoll {
    /// Deadline reached.
    Due,
    /// Armed, deadline still ahead.
    Pending,
    /// Not armed.
    Disarmed,
}

impl TimerPoll {
    #[inline]
    pub fn is_due(self) -> bool {
        matches!(self, TimerPoll::Due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    interval: Duration,
    deadline: Option<Instant>,
}

/// Deadline `d` after `now`. Only unrepresentable at the platform clock's
/// upper limit, where the timer falls due at once.
fn deadline_after(now: Instant, d: Duration) -> Instant {
    now.checked_add(d).unwrap_or(now)
}

impl Timer {
    /// Longest interval a timer holds; longer requests are clamped to it.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Disarmed timer with a default interval for the next `arm`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.min(Self::MAX_INTERVAL),
            deadline: None,
        }
    }

    /// Build from fractional seconds, rejecting negative or non-finite input.
    pub fn try_from_secs_f64(secs: f64) -> Result<Self, TimerError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(TimerError::InvalidInterval(secs));
        }
        Ok(Self::new(
            Duration::try_from_secs_f64(secs).unwrap_or(Self::MAX_INTERVAL),
        ))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm with the stored interval from `now`.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(deadline_after(now, self.interval));
    }

    /// Arm for `interval` from `now`; the interval becomes the new default.
    pub fn arm(&mut self, now: Instant, interval: Duration) {
        self.interval = interval.min(Self::MAX_INTERVAL);
        self.deadline = Some(deadline_after(now, self.interval));
    }

    /// Arm so that `remaining` is left, keeping `interval` as the nominal
    /// length. Used to resume a phase restored from storage.
    pub fn arm_remaining(&mut self, now: Instant, interval: Duration, remaining: Duration) {
        self.interval = interval.min(Self::MAX_INTERVAL);
        self.deadline = Some(deadline_after(now, remaining.min(self.interval)));
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Fire-once check: a due timer disarms itself.
    pub fn poll(&mut self, now: Instant) -> TimerPoll {
        match self.poll_sticky(now) {
            TimerPoll::Due => {
                self.deadline = None;
                TimerPoll::Due
            }
            other => other,
        }
    }

    /// Same check as [`Timer::poll`] but a due timer stays due until reset.
    pub fn poll_sticky(&self, now: Instant) -> TimerPoll {
        match self.deadline {
            None => TimerPoll::Disarmed,
            Some(deadline) if now >= deadline => TimerPoll::Due,
            Some(_) => TimerPoll::Pending,
        }
    }

    /// Time left, `None` when disarmed or already due.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.deadline {
            Some(deadline) if now < deadline => Some(deadline - now),
            _ => None,
        }
    }

    /// Change the interval. An armed timer keeps its elapsed progress: the
    /// deadline moves by `new - old` instead of restarting.
    pub fn rearm_interval(&mut self, new_interval: Duration) {
        let new_interval = new_interval.min(Self::MAX_INTERVAL);
        if let Some(deadline) = self.deadline {
            let shifted = if new_interval >= self.interval {
                deadline_after(deadline, new_interval - self.interval)
            } else {
                // Only unrepresentable before the platform's clock origin.
                deadline
                    .checked_sub(self.interval - new_interval)
                    .unwrap_or(deadline)
            };
            self.deadline = Some(shifted);
        }
        self.interval = new_interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const S: Duration = Duration::from_secs(1);

    #[test]
    fn fires_once_then_reports_disarmed() {
        let t0 = Instant::now();
        let mut t = Timer::new(S * 3);
        assert_eq!(t.poll(t0), TimerPoll::Disarmed);
        t.start(t0);
        assert_eq!(t.poll(t0 + S * 2), TimerPoll::Pending);
        assert_eq!(t.poll(t0 + S * 3), TimerPoll::Due);
        assert_eq!(t.poll(t0 + S * 4), TimerPoll::Disarmed);
    }

    #[test]
    fn sticky_poll_stays_due() {
        let t0 = Instant::now();
        let mut t = Timer::new(S);
        t.start(t0);
        assert_eq!(t.poll_sticky(t0 + S * 2), TimerPoll::Due);
        assert_eq!(t.poll_sticky(t0 + S * 9), TimerPoll::Due);
        assert!(t.is_armed());
    }

    #[test]
    fn remaining_is_none_once_due() {
        let t0 = Instant::now();
        let mut t = Timer::new(S * 10);
        assert_eq!(t.remaining(t0), None);
        t.start(t0);
        assert_eq!(t.remaining(t0 + S * 4), Some(S * 6));
        assert_eq!(t.remaining(t0 + S * 10), None);
    }

    #[test]
    fn rearm_preserves_elapsed_progress() {
        let t0 = Instant::now();
        let mut t = Timer::new(S * 10);
        t.start(t0);
        t.rearm_interval(S * 20);
        assert_eq!(t.remaining(t0 + S * 4), Some(S * 16));
        t.rearm_interval(S * 5);
        assert_eq!(t.poll(t0 + S * 5), TimerPoll::Due);
    }

    #[test]
    fn rearm_on_disarmed_timer_only_sets_interval() {
        let t0 = Instant::now();
        let mut t = Timer::new(S);
        t.rearm_interval(S * 7);
        assert!(!t.is_armed());
        t.start(t0);
        assert_eq!(t.remaining(t0), Some(S * 7));
    }

    #[test]
    fn rejects_negative_seconds() {
        assert_eq!(
            Timer::try_from_secs_f64(-1.0),
            Err(TimerError::InvalidInterval(-1.0))
        );
        assert!(Timer::try_from_secs_f64(f64::NAN).is_err());
        assert_eq!(Timer::try_from_secs_f64(1.5).map(|t| t.interval()), Ok(S * 3 / 2));
    }

    #[test]
    fn huge_intervals_clamp_instead_of_overflowing() {
        let t0 = Instant::now();
        assert_eq!(
            Timer::try_from_secs_f64(1e30).map(|t| t.interval()),
            Ok(Timer::MAX_INTERVAL)
        );

        let mut t = Timer::new(S);
        t.arm(t0, Duration::MAX);
        assert_eq!(t.interval(), Timer::MAX_INTERVAL);
        assert_eq!(t.remaining(t0), Some(Timer::MAX_INTERVAL));

        t.arm_remaining(t0, Duration::MAX, Duration::MAX);
        assert_eq!(t.remaining(t0), Some(Timer::MAX_INTERVAL));

        t.arm(t0, S);
        t.rearm_interval(Duration::MAX);
        assert_eq!(t.remaining(t0), Some(Timer::MAX_INTERVAL));
    }
}
