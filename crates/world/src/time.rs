//! Shared world clock.
//!
//! The clock is advanced by a single server task and read by every session's
//! keepalive timer; reads never mutate world state.

use std::sync::atomic::{AtomicU64, Ordering};

use mdbeta_core::SimTick;

/// Ticks per in-game day.
pub const TICKS_PER_DAY: u64 = 24_000;

/// Monotonic tick counter shared by all sessions.
#[derive(Debug, Default)]
pub struct WorldClock {
    tick: AtomicU64,
}

impl WorldClock {
    /// Create a clock starting at the given tick.
    pub fn starting_at(tick: SimTick) -> Self {
        Self {
            tick: AtomicU64::new(tick.0),
        }
    }

    /// Advance the clock by `ticks`, returning the new tick.
    pub fn advance(&self, ticks: u64) -> SimTick {
        SimTick(self.tick.fetch_add(ticks, Ordering::Relaxed) + ticks)
    }

    /// Current tick.
    pub fn now(&self) -> SimTick {
        SimTick(self.tick.load(Ordering::Relaxed))
    }

    /// Tick within the current day (0 = sunrise).
    pub fn time_of_day(&self) -> u64 {
        self.now().0 % TICKS_PER_DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_starts_at_zero() {
        let clock = WorldClock::default();
        assert_eq!(clock.now(), SimTick::ZERO);
    }

    #[test]
    fn advance_returns_new_tick() {
        let clock = WorldClock::starting_at(SimTick(10));
        assert_eq!(clock.advance(20), SimTick(30));
        assert_eq!(clock.now(), SimTick(30));
    }

    #[test]
    fn time_of_day_wraps_at_day_boundary() {
        let clock = WorldClock::starting_at(SimTick(TICKS_PER_DAY - 1));
        assert_eq!(clock.time_of_day(), TICKS_PER_DAY - 1);
        clock.advance(2);
        assert_eq!(clock.time_of_day(), 1);
    }
}
