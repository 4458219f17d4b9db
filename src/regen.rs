//! Local energy regeneration. The server recomputes energy on its own; any
//! drift is overwritten by the next reconciliation.

use crate::state::PlayerState;
use crate::time::Millis;

/// Energy restored per tick at `now`.
pub fn regen_rate(state: &PlayerState, per_tick: u32, now: Millis) -> u32 {
    per_tick.saturating_mul(state.boosters.regen_multiplier(now))
}

/// Apply `ticks` regeneration periods. Returns the energy actually gained.
pub fn regenerate(state: &mut PlayerState, ticks: u32, per_tick: u32, now: Millis) -> u32 {
    if ticks == 0 {
        return 0;
    }
    let before = state.energy;
    let gain = regen_rate(state, per_tick, now).saturating_mul(ticks);
    state.gain_energy(gain);
    state.energy - before
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::api::PlayerSnapshot;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_regen_never_exceeds_cap(
            energy in 0u32..1000,
            max_energy in 1u32..1000,
            ticks in 0u32..10_000,
            per_tick in 0u32..100,
        ) {
            let mut s = PlayerState::from_snapshot(PlayerSnapshot {
                energy,
                max_energy,
                ..PlayerSnapshot::default()
            });
            regenerate(&mut s, ticks, per_tick, 0);
            prop_assert!(s.energy <= s.max_energy);
        }
    }
}
