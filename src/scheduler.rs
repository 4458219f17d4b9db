//! Named periodic tasks driven from `Session::update`.
//!
//! Each task owns a [`Ticker`]; the scheduler only decides which of them are
//! running. Pausing freezes every ticker, resuming restarts them at the
//! current time so the paused interval produces no ticks at all.

use crate::config::SessionConfig;
use crate::time::{Millis, Ticker};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    Regeneration,
    AutoclickerPoll,
    ExpiryCheck,
}

impl TaskKind {
    pub fn all() -> [TaskKind; 3] {
        [
            TaskKind::Regeneration,
            TaskKind::AutoclickerPoll,
            TaskKind::ExpiryCheck,
        ]
    }

    fn index(self) -> usize {
        match self {
            TaskKind::Regeneration => 0,
            TaskKind::AutoclickerPoll => 1,
            TaskKind::ExpiryCheck => 2,
        }
    }
}

#[derive(Clone, Debug)]
struct PeriodicTask {
    ticker: Ticker,
    running: bool,
}

#[derive(Clone, Debug)]
pub struct Scheduler {
    tasks: [PeriodicTask; 3],
    paused: bool,
    cancelled: bool,
}

impl Scheduler {
    pub fn new(config: &SessionConfig) -> Self {
        let task = |period_ms, max_catch_up| PeriodicTask {
            ticker: Ticker::new(period_ms, max_catch_up),
            running: false,
        };
        Self {
            tasks: [
                task(config.regen_period_ms, config.regen_max_catch_up_ticks),
                // Polls never stack up: one late poll stands in for all missed.
                task(config.autoclicker_period_ms, 1),
                task(config.expiry_check_period_ms, 1),
            ],
            paused: false,
            cancelled: false,
        }
    }

    /// Start `kind` with its first tick one period after `now`. Starting a
    /// running task is a no-op, so callers cannot end up with two timers.
    pub fn start(&mut self, kind: TaskKind, now: Millis) {
        if self.cancelled {
            return;
        }
        let task = &mut self.tasks[kind.index()];
        if !task.running {
            task.running = true;
            task.ticker.restart(now);
        }
    }

    pub fn stop(&mut self, kind: TaskKind) {
        let task = &mut self.tasks[kind.index()];
        task.running = false;
        task.ticker.reset();
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks[kind.index()].running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn period_ms(&self, kind: TaskKind) -> Millis {
        self.tasks[kind.index()].ticker.period_ms()
    }

    /// Ticks due per running task, in `TaskKind` order. Empty while paused.
    pub fn due(&mut self, now: Millis) -> Vec<(TaskKind, u32)> {
        if self.paused || self.cancelled {
            return Vec::new();
        }
        TaskKind::all()
            .into_iter()
            .filter_map(|kind| {
                let task = &mut self.tasks[kind.index()];
                if !task.running {
                    return None;
                }
                match task.ticker.update(now) {
                    0 => None,
                    ticks => Some((kind, ticks)),
                }
            })
            .collect()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self, now: Millis) {
        if !self.paused {
            return;
        }
        self.paused = false;
        for task in self.tasks.iter_mut().filter(|t| t.running) {
            task.ticker.restart(now);
        }
    }

    /// Stop everything for good. Later `start` calls are ignored.
    pub fn cancel(&mut self) {
        for kind in TaskKind::all() {
            self.stop(kind);
        }
        self.cancelled = true;
    }
}
