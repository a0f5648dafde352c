/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time source used for probe attribution.
//!
//! The dispatcher only ever needs "microseconds elapsed since the last
//! update", so the trait hands out [`Instant`]s and callers subtract them.
//! `Instant` is monotonic; a clock that does not move yields a zero interval,
//! which attributes nothing.

#[cfg(test)]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
use std::time::Instant;

/// Microseconds per second, used when converting attributed time into a
/// bandwidth figure.
pub const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Source of monotonic time for the dispatcher.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same offset, so a test can keep one handle and give the
/// other to the dispatcher.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_us: Arc<AtomicU64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move time forward by `micros` microseconds.
    pub fn advance_micros(&self, micros: u64) {
        self.offset_us.fetch_add(micros, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_micros(self.offset_us.load(Ordering::SeqCst))
    }
}

/// Whole microseconds between `earlier` and `later`, saturating at zero.
pub fn elapsed_micros(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(elapsed_micros(t0, clock.now()), 0);

        clock.advance_micros(1_500);
        assert_eq!(elapsed_micros(t0, clock.now()), 1_500);

        clock.advance_micros(2_000_000);
        assert_eq!(elapsed_micros(t0, clock.now()), 2_001_500);
    }

    #[test]
    fn clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        let t0 = b.now();
        a.advance_micros(42);
        assert_eq!(elapsed_micros(t0, b.now()), 42);
    }

    #[test]
    fn elapsed_saturates_when_reversed() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance_micros(10);
        let t1 = clock.now();
        assert_eq!(elapsed_micros(t1, t0), 0);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
