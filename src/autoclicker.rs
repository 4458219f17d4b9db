//! Autoclicker poller: a two-state machine that follows the booster.
//!
//! The poller is `Polling` exactly while the autoclicker booster is
//! effectively active. At most one poll is outstanding at any time; a reply
//! that arrives after the poller stopped is still applied to the ledger but
//! cannot restart it.
//!
//! Each poll remembers the booster expiry it was sent for, so a reply that
//! says "inactive" can be told apart from one about a booster that has since
//! been replaced.

use crate::api::Ticket;
use crate::time::Millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

#[derive(Clone, Debug)]
pub struct AutoclickerPoller {
    state: PollerState,
    /// Ticket of the outstanding poll and the expiry it was sent for.
    outstanding: Option<(Ticket, Millis)>,
}

impl Default for AutoclickerPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoclickerPoller {
    pub fn new() -> Self {
        Self {
            state: PollerState::Idle,
            outstanding: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn is_polling(&self) -> bool {
        self.state == PollerState::Polling
    }

    /// Follow the booster's effective state. Returns the new state when it
    /// changed.
    pub fn observe(&mut self, booster_active: bool) -> Option<PollerState> {
        let next = if booster_active {
            PollerState::Polling
        } else {
            PollerState::Idle
        };
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }

    /// Whether a poll tick should issue a request now.
    pub fn should_poll(&self) -> bool {
        self.is_polling() && self.outstanding.is_none()
    }

    pub fn begin_poll(&mut self, ticket: Ticket, booster_expires_at: Millis) {
        self.outstanding = Some((ticket, booster_expires_at));
    }

    /// Returns the booster expiry the poll was sent for, or `None` for a
    /// ticket this poller did not issue.
    pub fn finish(&mut self, ticket: Ticket) -> Option<Millis> {
        match self.outstanding {
            Some((outstanding, expires_at)) if outstanding == ticket => {
                self.outstanding = None;
                Some(expires_at)
            }
            _ => None,
        }
    }

    pub fn stop(&mut self) -> Option<PollerState> {
        self.observe(false)
    }
}
