use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source shared by every timer in the control loop.
///
/// Handlers never call `sleep`; only the outer scheduling loop paces itself
/// with it between ticks.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Time elapsed since `epoch`, zero if `epoch` lies in the future.
    fn since(&self, epoch: Instant) -> Duration {
        self.now().saturating_duration_since(epoch)
    }
}

/// Wall-clock monotonic time backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Manually driven clock for tests and accelerated simulation.
///
/// now() = origin + offset; sleep(d) advances the offset without blocking.
/// Clones share the same offset, so a test can hold one handle while the
/// controller owns another.
#[derive(Debug, Clone)]
pub struct TestClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Offset of the current time from the clock's origin.
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_clones_share_time() {
        let a = TestClock::new();
        let b = a.clone();
        let t0 = b.now();
        a.advance_secs(5);
        assert_eq!(b.now() - t0, Duration::from_secs(5));
        b.sleep(Duration::from_millis(250));
        assert_eq!(a.elapsed(), Duration::from_millis(5250));
    }

    #[test]
    fn since_saturates_for_future_epoch() {
        let c = TestClock::new();
        let future = c.now() + Duration::from_secs(1);
        assert_eq!(c.since(future), Duration::ZERO);
    }
}
