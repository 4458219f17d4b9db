//! Expiry watchdog: raises each near-expiry warning once per bucket.
//!
//! Warnings come from two sources, a local scan of the booster registry and
//! the server's `check-expiry` reply. Both go through the same dedup table,
//! keyed by `booster_warning_{kind}_{minutes_left / bucket}`. A key stays
//! suppressed for the dedup window, after which the same bucket may warn
//! again.

use std::collections::BTreeMap;

use crate::api::{ExpiryWarning, Ticket};
use crate::boosters::{BoosterKind, BoosterRegistry};
use crate::config::SessionConfig;
use crate::time::Millis;

const MINUTE_MS: Millis = 60_000;

/// A warning ready to show to the player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoosterWarning {
    pub kind: BoosterKind,
    pub minutes_left: u32,
    pub message: String,
}

impl BoosterWarning {
    /// Warning computed on this side from the registry.
    pub fn local(kind: BoosterKind, remaining_ms: Millis) -> Self {
        // Whole minutes, floored like the bucket, so 9.5 min keys with the
        // server's 9.
        let minutes_left = u32::try_from(remaining_ms / MINUTE_MS).unwrap_or(u32::MAX);
        let message = if minutes_left == 0 {
            format!("{} ends in under a minute", kind.name())
        } else {
            format!("{} ends in {} min", kind.name(), minutes_left)
        };
        Self {
            kind,
            minutes_left,
            message,
        }
    }
}

impl From<ExpiryWarning> for BoosterWarning {
    fn from(w: ExpiryWarning) -> Self {
        let message = if w.message.is_empty() {
            format!("{} ends in {} min", w.kind.name(), w.minutes_left)
        } else {
            w.message
        };
        Self {
            kind: w.kind,
            minutes_left: w.minutes_left,
            message,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpiryWatchdog {
    threshold_ms: Millis,
    bucket_minutes: u32,
    window_ms: Millis,
    /// Dedup key -> time it was shown.
    shown: BTreeMap<String, Millis>,
    outstanding: Option<Ticket>,
}

impl ExpiryWatchdog {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            threshold_ms: config.expiry_warning_threshold_ms,
            bucket_minutes: config.warning_bucket_minutes.max(1),
            window_ms: config.warning_dedup_window_ms,
            shown: BTreeMap::new(),
            outstanding: None,
        }
    }

    pub fn warning_key(&self, warning: &BoosterWarning) -> String {
        format!(
            "booster_warning_{}_{}",
            warning.kind.wire_name(),
            warning.minutes_left / self.bucket_minutes
        )
    }

    /// Effectively active boosters within the warning threshold.
    pub fn scan(&self, registry: &BoosterRegistry, now: Millis) -> Vec<BoosterWarning> {
        registry
            .iter()
            .filter_map(|(kind, state)| {
                let remaining = state.remaining_ms(now)?;
                (remaining <= self.threshold_ms)
                    .then(|| BoosterWarning::local(kind.clone(), remaining))
            })
            .collect()
    }

    /// Record `warning` as shown unless its key is still suppressed.
    /// Returns whether the caller should raise it.
    pub fn admit(&mut self, warning: &BoosterWarning, now: Millis) -> bool {
        self.prune(now);
        let key = self.warning_key(warning);
        if self.shown.contains_key(&key) {
            return false;
        }
        self.shown.insert(key, now);
        true
    }

    /// Forget keys whose window has passed.
    pub fn prune(&mut self, now: Millis) {
        let window = self.window_ms;
        self.shown
            .retain(|_, shown_at| now.saturating_sub(*shown_at) < window);
    }

    pub fn is_checking(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Returns false if a remote check is already outstanding.
    pub fn begin_check(&mut self, ticket: Ticket) -> bool {
        if self.outstanding.is_some() {
            return false;
        }
        self.outstanding = Some(ticket);
        true
    }

    pub fn finish_check(&mut self, ticket: Ticket) -> bool {
        if self.outstanding == Some(ticket) {
            self.outstanding = None;
            true
        } else {
            false
        }
    }

    /// Dedup table, for persistence.
    pub fn shown(&self) -> &BTreeMap<String, Millis> {
        &self.shown
    }

    /// Merge a persisted dedup table, keeping the later timestamp per key.
    pub fn restore_shown(&mut self, shown: BTreeMap<String, Millis>, now: Millis) {
        for (key, at) in shown {
            let entry = self.shown.entry(key).or_insert(at);
            *entry = (*entry).max(at);
        }
        self.prune(now);
    }
}
