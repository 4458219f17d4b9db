//! Tap engine: the hot path. Pure state mutation, no I/O, constant time.

use crate::state::{PlayerState, TapRecord};
use crate::time::Millis;

/// What the UI learns from a tap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TapOutcome {
    pub accepted: bool,
    pub rewarded: u64,
}

impl TapOutcome {
    pub fn rejected() -> Self {
        Self {
            accepted: false,
            rewarded: 0,
        }
    }
}

/// A tap refused for lack of energy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InsufficientEnergy {
    pub required: u32,
    pub available: u32,
}

/// Reward for one tap at `now`.
pub fn effective_power(state: &PlayerState, now: Millis) -> u32 {
    state
        .tap_power
        .saturating_mul(state.boosters.tap_multiplier(now))
}

#[derive(Clone, Debug)]
pub struct TapEngine {
    first_tap_interval_ms: Millis,
    last_tap_at: Option<Millis>,
}

impl TapEngine {
    pub fn new(first_tap_interval_ms: Millis) -> Self {
        Self {
            first_tap_interval_ms,
            last_tap_at: None,
        }
    }

    /// Apply one tap to `state`. On success returns the record to enqueue.
    pub fn tap(
        &mut self,
        state: &mut PlayerState,
        now: Millis,
    ) -> Result<TapRecord, InsufficientEnergy> {
        let power = effective_power(state, now);
        if state.energy < power {
            return Err(InsufficientEnergy {
                required: power,
                available: state.energy,
            });
        }

        let reward = power as u64;
        state.spend_energy(reward);
        state.credit(reward);

        let interval_ms = match self.last_tap_at {
            Some(prev) => now.saturating_sub(prev),
            None => self.first_tap_interval_ms,
        };
        self.last_tap_at = Some(now);

        Ok(TapRecord {
            count: 1,
            interval_ms,
            timestamp: now,
            reward,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PlayerSnapshot;
    use crate::boosters::{BoosterKind, BoosterRegistry, BoosterState};

    fn state(energy: u32, tap_power: u32) -> PlayerState {
        PlayerState::from_snapshot(PlayerSnapshot {
            energy,
            max_energy: 1000,
            tap_power,
            ..PlayerSnapshot::default()
        })
    }

    fn with_double_tap(mut s: PlayerState, expires_at: Millis) -> PlayerState {
        s.boosters = BoosterRegistry::new(
            [(BoosterKind::DoubleTap, BoosterState::new(true, expires_at))]
                .into_iter()
                .collect(),
        );
        s
    }

    #[test]
    fn tap_moves_energy_into_coins() {
        let mut s = state(1000, 3);
        let mut engine = TapEngine::new(100);
        let record = engine.tap(&mut s, 0).unwrap();
        assert_eq!(record.reward, 3);
        assert_eq!(s.energy, 997);
        assert_eq!(s.coins, 3);
        assert_eq!(s.total_earned, 3);
    }

    #[test]
    fn first_tap_uses_default_interval() {
        let mut s = state(1000, 1);
        let mut engine = TapEngine::new(100);
        assert_eq!(engine.tap(&mut s, 5_000).unwrap().interval_ms, 100);
        assert_eq!(engine.tap(&mut s, 5_240).unwrap().interval_ms, 240);
        assert_eq!(engine.tap(&mut s, 5_240).unwrap().interval_ms, 0);
    }

    #[test]
    fn insufficient_energy_leaves_state_untouched() {
        let mut s = state(2, 3);
        let before = s.clone();
        let mut engine = TapEngine::new(100);
        let err = engine.tap(&mut s, 0).unwrap_err();
        assert_eq!(
            err,
            InsufficientEnergy {
                required: 3,
                available: 2
            }
        );
        assert_eq!(s, before);
    }

    #[test]
    fn rejected_tap_does_not_move_interval_reference() {
        let mut s = state(1, 1);
        let mut engine = TapEngine::new(100);
        engine.tap(&mut s, 1_000).unwrap();
        assert!(engine.tap(&mut s, 1_200).is_err());
        s.energy = 10;
        assert_eq!(engine.tap(&mut s, 1_500).unwrap().interval_ms, 500);
    }

    #[test]
    fn double_tap_doubles_reward() {
        let mut s = with_double_tap(state(1000, 2), 10_000);
        let mut engine = TapEngine::new(100);
        assert_eq!(engine.tap(&mut s, 9_000).unwrap().reward, 4);
        assert_eq!(s.energy, 996);
    }

    #[test]
    fn expired_double_tap_is_ignored() {
        let now = 10_000;
        let mut s = with_double_tap(state(1000, 1), now - 1_000);
        let mut engine = TapEngine::new(100);
        assert_eq!(effective_power(&s, now), 1);
        assert_eq!(engine.tap(&mut s, now).unwrap().reward, 1);
    }

    #[test]
    fn exact_energy_is_enough() {
        let mut s = state(5, 5);
        let mut engine = TapEngine::new(100);
        assert!(engine.tap(&mut s, 0).is_ok());
        assert_eq!(s.energy, 0);
    }
}
