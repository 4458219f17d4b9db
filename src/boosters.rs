//! Booster registry: the read model over time-boxed effects.
//!
//! A booster only counts when its stored flag is set *and* its expiry lies in
//! the future; the flag alone is never trusted. The registry is replaced only
//! from server data, so its mutators are crate-private.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::time::Millis;

/// Kinds of boosters the backend knows about.
///
/// Wire names follow the backend (`twix` is the double-tap booster,
/// `energy2x` the double-regeneration one); descriptive aliases are accepted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BoosterKind {
    Autoclicker,
    Stamina,
    DoubleTap,
    DoubleEnergy,
    /// A booster this client does not interpret. Kept so warnings still work.
    Other(String),
}

impl BoosterKind {
    pub fn wire_name(&self) -> &str {
        match self {
            BoosterKind::Autoclicker => "autoclicker",
            BoosterKind::Stamina => "stamina",
            BoosterKind::DoubleTap => "twix",
            BoosterKind::DoubleEnergy => "energy2x",
            BoosterKind::Other(name) => name,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        match self {
            BoosterKind::Autoclicker => "Autoclicker",
            BoosterKind::Stamina => "Stamina",
            BoosterKind::DoubleTap => "Double Tap",
            BoosterKind::DoubleEnergy => "Double Energy",
            BoosterKind::Other(name) => name,
        }
    }
}

impl From<&str> for BoosterKind {
    fn from(name: &str) -> Self {
        match name {
            "autoclicker" => BoosterKind::Autoclicker,
            "stamina" => BoosterKind::Stamina,
            "twix" | "doubleTap" => BoosterKind::DoubleTap,
            "energy2x" | "doubleEnergy" => BoosterKind::DoubleEnergy,
            other => BoosterKind::Other(other.to_string()),
        }
    }
}

impl From<String> for BoosterKind {
    fn from(name: String) -> Self {
        BoosterKind::from(name.as_str())
    }
}

impl From<BoosterKind> for String {
    fn from(kind: BoosterKind) -> Self {
        kind.wire_name().to_string()
    }
}

/// Stored state of one booster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterState {
    #[serde(default)]
    pub active: bool,
    #[serde(default, with = "crate::api::timestamp")]
    pub expires_at: Millis,
}

impl BoosterState {
    pub fn new(active: bool, expires_at: Millis) -> Self {
        Self { active, expires_at }
    }

    pub fn is_active_at(&self, now: Millis) -> bool {
        self.active && now < self.expires_at
    }

    /// Time left while effectively active.
    pub fn remaining_ms(&self, now: Millis) -> Option<Millis> {
        if self.is_active_at(now) {
            Some(self.expires_at - now)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoosterRegistry {
    boosters: BTreeMap<BoosterKind, BoosterState>,
}

impl BoosterRegistry {
    pub fn new(boosters: BTreeMap<BoosterKind, BoosterState>) -> Self {
        Self { boosters }
    }

    pub fn get(&self, kind: &BoosterKind) -> Option<&BoosterState> {
        self.boosters.get(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BoosterKind, &BoosterState)> {
        self.boosters.iter()
    }

    pub fn is_active(&self, kind: &BoosterKind, now: Millis) -> bool {
        self.boosters
            .get(kind)
            .is_some_and(|b| b.is_active_at(now))
    }

    pub fn remaining_ms(&self, kind: &BoosterKind, now: Millis) -> Option<Millis> {
        self.boosters.get(kind)?.remaining_ms(now)
    }

    /// Kinds that are effectively active at `now`, in key order.
    pub fn active_kinds(&self, now: Millis) -> impl Iterator<Item = &BoosterKind> {
        self.boosters
            .iter()
            .filter(move |(_, b)| b.is_active_at(now))
            .map(|(k, _)| k)
    }

    /// Reward multiplier for a single tap.
    pub fn tap_multiplier(&self, now: Millis) -> u32 {
        if self.is_active(&BoosterKind::DoubleTap, now) {
            2
        } else {
            1
        }
    }

    /// Multiplier on the regeneration rate.
    pub fn regen_multiplier(&self, now: Millis) -> u32 {
        if self.is_active(&BoosterKind::DoubleEnergy, now) {
            2
        } else {
            1
        }
    }

    pub(crate) fn replace_all(&mut self, boosters: BTreeMap<BoosterKind, BoosterState>) {
        self.boosters = boosters;
    }

    /// The server reported `kind` as over; keep its expiry for display.
    pub(crate) fn mark_inactive(&mut self, kind: &BoosterKind) {
        if let Some(b) = self.boosters.get_mut(kind) {
            b.active = false;
        }
    }
}
