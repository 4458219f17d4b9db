//! Notifications delivered to the UI, and the bounded activity log.

use std::collections::VecDeque;

use crate::expiry::BoosterWarning;
use crate::state::Balance;

/// Where on the tap target the player touched. Only forwarded to observers
/// (for floating "+N" effects); it never affects the economy.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TapPosition {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Tapped {
        position: TapPosition,
        rewarded: u64,
    },
    InsufficientEnergy {
        required: u32,
        available: u32,
    },
    /// Any change of coins, energy or lifetime earnings.
    StateChanged(Balance),
    /// A flush failed transiently; the taps are queued again.
    SyncPending {
        pending_taps: usize,
    },
    Synced {
        taps: usize,
    },
    /// The server refused a batch; its coins were taken back.
    BatchRejected {
        taps: usize,
        reason: String,
    },
    AutoclickerStarted,
    AutoclickerStopped,
    AutoclickerEarned {
        coins: u64,
    },
    BoosterExpiring(BoosterWarning),
}

impl SessionEvent {
    /// Activity log line for events worth keeping, with its importance.
    pub fn log_line(&self) -> Option<(String, bool)> {
        match self {
            SessionEvent::Tapped { .. }
            | SessionEvent::StateChanged(_)
            | SessionEvent::Synced { .. } => None,
            SessionEvent::InsufficientEnergy { .. } => {
                Some(("Not enough energy".to_string(), false))
            }
            SessionEvent::SyncPending { pending_taps } => Some((
                format!("Sync failed, {pending_taps} taps waiting"),
                false,
            )),
            SessionEvent::BatchRejected { taps, reason } => Some((
                format!("Server rejected {taps} taps: {reason}"),
                true,
            )),
            SessionEvent::AutoclickerStarted => Some(("Autoclicker running".to_string(), false)),
            SessionEvent::AutoclickerStopped => Some(("Autoclicker stopped".to_string(), false)),
            SessionEvent::AutoclickerEarned { coins } => {
                Some((format!("Autoclicker earned {coins} coins"), false))
            }
            SessionEvent::BoosterExpiring(w) => Some((w.message.clone(), true)),
        }
    }
}

/// Handle returned by `Session::subscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&SessionEvent)>;

/// Registered observers, called in subscription order.
#[derive(Default)]
pub struct Observers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

impl Observers {
    pub fn subscribe(&mut self, callback: impl FnMut(&SessionEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.callbacks.push((id, Box::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(sub, _)| *sub != id);
        self.callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn notify(&mut self, event: &SessionEvent) {
        for (_, callback) in &mut self.callbacks {
            callback(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("count", &self.callbacks.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub text: String,
    pub is_important: bool,
}

const MAX_LOG_ENTRIES: usize = 50;

/// Most recent notable events, oldest first.
#[derive(Clone, Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
}

impl ActivityLog {
    pub fn add_log(&mut self, text: &str, is_important: bool) {
        self.entries.push_back(LogEntry {
            text: text.to_string(),
            is_important,
        });
        if self.entries.len() > MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
