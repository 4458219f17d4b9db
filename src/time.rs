//! Clock sources and the fixed-period ticker used by every periodic task.
//!
//! Hosts call `Session::update()` at whatever rate they like (animation
//! frames, a coarse timer, or only when woken up). `Ticker` converts those
//! irregular calls into a whole number of fixed-length periods, clamping the
//! elapsed time so that a tab coming back from the background does not fire
//! a storm of missed ticks.

use std::cell::Cell;
use std::rc::Rc;

/// Milliseconds since the Unix epoch.
pub type Millis = u64;

/// Source of wall-clock time.
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// The real wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> Millis {
        chrono::Utc::now().timestamp_millis().max(0) as Millis
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> Millis {
        js_sys::Date::now().max(0.0) as Millis
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }

    pub fn advance(&self, delta: Millis) {
        self.now.set(self.now.get().saturating_add(delta));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

/// Fixed-period accumulator.
#[derive(Clone, Debug)]
pub struct Ticker {
    /// Length of one tick.
    period_ms: Millis,
    /// Upper bound on ticks reported by a single `update`.
    max_catch_up: u32,
    /// Elapsed milliseconds not yet consumed as ticks.
    accumulator: Millis,
    /// Timestamp of the last update, None until started.
    last_timestamp: Option<Millis>,
    /// Total ticks reported since creation.
    pub total_ticks: u64,
}

impl Ticker {
    /// `period_ms` must be non-zero (enforced by `SessionConfig::validate`).
    pub fn new(period_ms: Millis, max_catch_up: u32) -> Self {
        Self {
            period_ms: period_ms.max(1),
            max_catch_up: max_catch_up.max(1),
            accumulator: 0,
            last_timestamp: None,
            total_ticks: 0,
        }
    }

    pub fn period_ms(&self) -> Millis {
        self.period_ms
    }

    /// Begin counting from `now`, discarding any partial period.
    pub fn restart(&mut self, now: Millis) {
        self.accumulator = 0;
        self.last_timestamp = Some(now);
    }

    /// Forget the reference point; the next `update` acts like a first frame.
    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.last_timestamp = None;
    }

    /// Feed the current time. Returns the number of whole periods elapsed
    /// since the previous call, at most `max_catch_up`.
    pub fn update(&mut self, now: Millis) -> u32 {
        let delta = match self.last_timestamp {
            // A clock that steps backwards yields zero, not a huge delta.
            Some(prev) => now
                .saturating_sub(prev)
                .min(self.period_ms.saturating_mul(self.max_catch_up as Millis)),
            None => 0,
        };
        self.last_timestamp = Some(now);

        self.accumulator += delta;
        let ticks = (self.accumulator / self.period_ms).min(self.max_catch_up as Millis);
        self.accumulator -= ticks * self.period_ms;
        // Leftover beyond the clamp is dropped rather than carried.
        self.accumulator = self.accumulator.min(self.period_ms - 1);
        self.total_ticks += ticks;
        ticks as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_returns_zero_ticks() {
        let mut t = Ticker::new(100, 5);
        assert_eq!(t.update(0), 0);
    }

    #[test]
    fn one_tick_per_period() {
        let mut t = Ticker::new(100, 5);
        t.update(0);
        assert_eq!(t.update(100), 1);
        assert_eq!(t.total_ticks, 1);
    }

    #[test]
    fn multiple_ticks_accumulated() {
        let mut t = Ticker::new(100, 5);
        t.update(0);
        assert_eq!(t.update(350), 3);
        assert_eq!(t.total_ticks, 3);
    }

    #[test]
    fn remainder_carried_over() {
        let mut t = Ticker::new(100, 5);
        t.update(0);
        t.update(150); // 1 tick, 50ms left
        assert_eq!(t.update(200), 1); // 50ms + 50ms
        assert_eq!(t.total_ticks, 2);
    }

    #[test]
    fn long_gap_is_clamped() {
        let mut t = Ticker::new(1000, 5);
        t.update(0);
        // Ten minutes in the background → at most five ticks.
        assert_eq!(t.update(600_000), 5);
        assert_eq!(t.update(600_500), 0);
        assert_eq!(t.update(601_000), 1);
    }

    #[test]
    fn single_catch_up_never_reports_two() {
        let mut t = Ticker::new(2000, 1);
        t.restart(0);
        assert_eq!(t.update(10_000), 1);
        assert_eq!(t.update(11_999), 0);
        assert_eq!(t.update(12_000), 1);
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let mut t = Ticker::new(100, 5);
        t.update(1_000);
        assert_eq!(t.update(500), 0);
        assert_eq!(t.update(600), 1);
    }

    #[test]
    fn restart_discards_partial_period() {
        let mut t = Ticker::new(100, 5);
        t.update(0);
        t.update(90);
        t.restart(1_000);
        assert_eq!(t.update(1_050), 0);
        assert_eq!(t.update(1_100), 1);
    }

    #[test]
    fn sub_period_frames_accumulate() {
        let mut t = Ticker::new(100, 5);
        t.update(0);
        for ms in [16, 32, 48, 64, 80, 96] {
            assert_eq!(t.update(ms), 0);
        }
        assert_eq!(t.update(112), 1);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now_ms(), 15);
        other.set(100);
        assert_eq!(clock.now_ms(), 100);
    }
}
