//! Interval Timing
//!
//! Clocks used by the correlator to time START/STOP pairs. The monotonic clock
//! reads `std::time::Instant`; the manual clock is advanced explicitly and makes
//! replays and tests deterministic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of nanosecond timestamps for interval correlation
pub trait Clock: Send + Sync + fmt::Debug {
    /// Nanoseconds since an arbitrary, fixed origin. Never decreases.
    fn now_ns(&self) -> u64;
}

// ─── MonotonicClock ──────────────────────────────────────────────────────────

/// Wall-clock time since the clock was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a new clock at zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

// ─── ManualClock ─────────────────────────────────────────────────────────────

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ns`
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// Move the clock forward by `delta_ns`
    pub fn advance(&self, delta_ns: u64) {
        self.now.fetch_add(delta_ns, Ordering::Relaxed);
    }

    /// Jump to `now_ns`; earlier values are ignored to keep the clock monotonic
    pub fn set(&self, now_ns: u64) {
        self.now.fetch_max(now_ns, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_monotonic_clock() {
        let clock = MonotonicClock::new();
        let a = clock.now_ns();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.now_ns();

        // Should be at least ~5ms apart
        assert!(b >= a + 1_000_000);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(100);
        clock.advance(50);
        assert_eq!(clock.now_ns(), 150);

        clock.set(120); // never goes backwards
        assert_eq!(clock.now_ns(), 150);

        clock.set(1_000);
        assert_eq!(clock.now_ns(), 1_000);
    }
}
