//! Player economy state mirrored from the server.
use serde::{Deserialize, Serialize};

use crate::api::PlayerSnapshot;
use crate::boosters::BoosterRegistry;
use crate::time::Millis;

/// League placement, as last reported by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "LeagueRepr")]
pub struct League {
    pub name: String,
    pub color: Option<String>,
}

/// The backend sends either a bare name or a `{name, color}` object.
#[derive(Deserialize)]
#[serde(untagged)]
enum LeagueRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
}

impl From<LeagueRepr> for League {
    fn from(repr: LeagueRepr) -> Self {
        match repr {
            LeagueRepr::Name(name) => League { name, color: None },
            LeagueRepr::Full { name, color } => League { name, color },
        }
    }
}

/// One accepted tap, owned by the sync batcher until a flush succeeds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapRecord {
    pub count: u32,
    /// Time since the previous tap.
    pub interval_ms: Millis,
    pub timestamp: Millis,
    /// Coins (and energy) this tap moved locally.
    pub reward: u64,
}

/// The authoritative coin/energy triple carried by every server reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ledger {
    pub coins: u64,
    pub energy: u32,
    pub total_earned: u64,
}

/// Full state of the player's economy as seen by this client.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    /// Spendable balance.
    pub coins: u64,
    /// Lifetime earnings; drives league placement.
    pub total_earned: u64,
    pub energy: u32,
    pub max_energy: u32,
    /// Base reward per tap.
    pub tap_power: u32,
    pub boosters: BoosterRegistry,
    pub league: Option<League>,
}

impl PlayerState {
    pub fn from_snapshot(snapshot: PlayerSnapshot) -> Self {
        let mut state = Self {
            coins: snapshot.coins,
            total_earned: snapshot.total_earned,
            energy: snapshot.energy,
            max_energy: snapshot.max_energy,
            tap_power: snapshot.tap_power,
            boosters: snapshot.boosters,
            league: snapshot.league,
        };
        state.restore_invariants();
        state
    }

    /// Energy as a fraction of the cap, for gauges.
    pub fn energy_ratio(&self) -> f64 {
        self.energy as f64 / self.max_energy as f64
    }

    /// Add coins earned locally.
    pub(crate) fn credit(&mut self, amount: u64) {
        self.coins = self.coins.saturating_add(amount);
        self.total_earned = self.total_earned.saturating_add(amount);
    }

    /// Take back coins the server refused to count.
    pub(crate) fn debit(&mut self, amount: u64) {
        self.coins = self.coins.saturating_sub(amount);
        self.total_earned = self.total_earned.saturating_sub(amount).max(self.coins);
    }

    pub(crate) fn spend_energy(&mut self, amount: u64) {
        let amount = u32::try_from(amount).unwrap_or(u32::MAX);
        self.energy = self.energy.saturating_sub(amount);
    }

    pub(crate) fn gain_energy(&mut self, amount: u32) {
        self.energy = self.energy.saturating_add(amount).min(self.max_energy);
    }

    /// Replace the ledger with server values, then re-apply the optimistic
    /// deltas the server has not seen yet.
    pub(crate) fn reconcile(&mut self, ledger: Ledger, unacknowledged_reward: u64) {
        self.coins = ledger.coins;
        self.total_earned = ledger.total_earned;
        self.energy = ledger.energy;
        self.restore_invariants();

        self.credit(unacknowledged_reward);
        self.spend_energy(unacknowledged_reward);
    }

    pub(crate) fn restore_invariants(&mut self) {
        self.max_energy = self.max_energy.max(1);
        self.tap_power = self.tap_power.max(1);
        self.energy = self.energy.min(self.max_energy);
        self.total_earned = self.total_earned.max(self.coins);
    }
}

/// Copyable view of the numbers a UI redraws on every change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Balance {
    pub coins: u64,
    pub total_earned: u64,
    pub energy: u32,
    pub max_energy: u32,
}

impl Balance {
    pub fn of(state: &PlayerState) -> Self {
        Self {
            coins: state.coins,
            total_earned: state.total_earned,
            energy: state.energy,
            max_energy: state.max_energy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PlayerState {
        PlayerState::from_snapshot(PlayerSnapshot {
            coins: 100,
            total_earned: 150,
            energy: 500,
            max_energy: 1000,
            tap_power: 1,
            ..PlayerSnapshot::default()
        })
    }

    #[test]
    fn snapshot_invariants_are_restored() {
        let s = PlayerState::from_snapshot(PlayerSnapshot {
            coins: 50,
            total_earned: 10,
            energy: 5000,
            max_energy: 1000,
            tap_power: 0,
            ..PlayerSnapshot::default()
        });
        assert_eq!(s.energy, 1000);
        assert_eq!(s.total_earned, 50);
        assert_eq!(s.tap_power, 1);
    }

    #[test]
    fn credit_raises_both_balances() {
        let mut s = state();
        s.credit(7);
        assert_eq!(s.coins, 107);
        assert_eq!(s.total_earned, 157);
    }

    #[test]
    fn debit_never_underflows() {
        let mut s = state();
        s.debit(1_000);
        assert_eq!(s.coins, 0);
        assert_eq!(s.total_earned, 0);
    }

    #[test]
    fn energy_is_clamped_both_ways() {
        let mut s = state();
        s.gain_energy(10_000);
        assert_eq!(s.energy, 1000);
        s.spend_energy(u64::MAX);
        assert_eq!(s.energy, 0);
    }

    #[test]
    fn reconcile_replaces_then_reapplies() {
        let mut s = state();
        s.reconcile(
            Ledger {
                coins: 400,
                energy: 900,
                total_earned: 600,
            },
            5,
        );
        assert_eq!(s.coins, 405);
        assert_eq!(s.total_earned, 605);
        assert_eq!(s.energy, 895);
    }

    #[test]
    fn reconcile_clamps_server_energy_to_cap() {
        let mut s = state();
        s.reconcile(
            Ledger {
                coins: 0,
                energy: 2000,
                total_earned: 0,
            },
            0,
        );
        assert_eq!(s.energy, 1000);
    }

    #[test]
    fn league_accepts_name_or_object() {
        let bare: League = serde_json::from_str(r#""Gold""#).unwrap();
        assert_eq!(bare.name, "Gold");
        assert_eq!(bare.color, None);
        let full: League =
            serde_json::from_str(r##"{"name": "Diamond", "color": "#b9f2ff"}"##).unwrap();
        assert_eq!(full.color.as_deref(), Some("#b9f2ff"));
    }

    #[test]
    fn energy_ratio() {
        let s = state();
        assert!((s.energy_ratio() - 0.5).abs() < 1e-9);
    }
}
