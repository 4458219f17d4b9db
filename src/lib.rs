//! Client-side tap aggregation and reconciliation for a tap-to-earn game.
//!
//! A [`Session`] accepts taps instantly against a local, optimistic copy of
//! the player's economy, batches them for the server, and folds every
//! authoritative reply back in without losing the taps the server has not
//! seen yet. Energy regeneration, autoclicker polling and booster expiry
//! warnings run as periodic tasks driven by [`Session::update`].
//!
//! The crate performs no I/O. Requests are handed to the host through
//! [`Session::take_requests`] and completed with `Session::complete_*`, or
//! pushed through a blocking [`Backend`] with [`Session::pump`].

pub mod api;
pub mod autoclicker;
pub mod boosters;
pub mod config;
pub mod error;
pub mod events;
pub mod expiry;
#[cfg(target_arch = "wasm32")]
pub mod logging;
pub mod regen;
pub mod save;
pub mod scheduler;
pub mod session;
mod simulator;
pub mod state;
pub mod sync;
pub mod tap;
#[cfg(test)]
mod testing;
pub mod time;

pub use api::{
    AutoclickerTick, Backend, BoosterActivation, Call, CallKind, Credential, ExpiryReport,
    ExpiryWarning, PlayerSnapshot, Request, SyncBatch, TapReceipt, Ticket, UpgradeReceipt,
};
pub use autoclicker::PollerState;
pub use boosters::{BoosterKind, BoosterRegistry, BoosterState};
pub use config::SessionConfig;
pub use error::{ApiError, CompletionError, ConfigError, SaveError};
pub use events::{ActivityLog, LogEntry, SessionEvent, SubscriptionId, TapPosition};
pub use expiry::BoosterWarning;
pub use save::{MemoryStorage, Storage};
pub use session::{Lifecycle, Session};
pub use state::{Balance, League, Ledger, PlayerState, TapRecord};
pub use tap::TapOutcome;
pub use time::{Clock, ManualClock, Millis, SystemClock};

#[cfg(target_arch = "wasm32")]
pub use save::LocalStorage;
