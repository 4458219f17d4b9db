#![cfg(test)]
//! In-process stand-in for the game server.

use std::collections::VecDeque;

use crate::api::{
    AutoclickerTick, Backend, Credential, ExpiryReport, ExpiryWarning, PlayerSnapshot, SyncBatch,
    TapReceipt,
};
use crate::error::ApiError;

/// Keeps its own ledger and answers like the real endpoints. Failures are
/// scripted per endpoint and consumed in order.
#[derive(Debug, Default)]
pub struct FakeServer {
    pub coins: u64,
    pub total_earned: u64,
    pub energy: u32,
    pub tap_power: u64,
    pub autoclicker_active: bool,
    /// Coins credited per autoclicker poll.
    pub autoclicker_rate: u64,
    pub warnings: Vec<ExpiryWarning>,
    pub submit_failures: VecDeque<ApiError>,
    pub poll_failures: VecDeque<ApiError>,
    /// Every batch the server accepted.
    pub batches: Vec<SyncBatch>,
    pub polls: usize,
    pub expiry_checks: usize,
}

impl FakeServer {
    pub fn new(snapshot: &PlayerSnapshot) -> Self {
        Self {
            coins: snapshot.coins,
            total_earned: snapshot.total_earned,
            energy: snapshot.energy,
            tap_power: snapshot.tap_power as u64,
            ..Self::default()
        }
    }

    /// Taps the server has counted.
    pub fn counted_taps(&self) -> u64 {
        self.batches.iter().map(|b| b.total_taps).sum()
    }
}

impl Backend for FakeServer {
    fn submit_taps(
        &mut self,
        _credential: &Credential,
        batch: &SyncBatch,
    ) -> Result<TapReceipt, ApiError> {
        if let Some(err) = self.submit_failures.pop_front() {
            return Err(err);
        }
        let earned = batch.total_taps * self.tap_power;
        self.coins += earned;
        self.total_earned += earned;
        self.energy = self
            .energy
            .saturating_sub(u32::try_from(earned).unwrap_or(u32::MAX));
        self.batches.push(batch.clone());
        Ok(TapReceipt {
            coins: self.coins,
            energy: self.energy,
            total_earned: self.total_earned,
            league: None,
        })
    }

    fn poll_autoclicker(&mut self, _credential: &Credential) -> Result<AutoclickerTick, ApiError> {
        self.polls += 1;
        if let Some(err) = self.poll_failures.pop_front() {
            return Err(err);
        }
        if !self.autoclicker_active {
            return Ok(AutoclickerTick {
                active: false,
                coins: None,
                energy: None,
                total_earned: None,
                coins_earned: 0,
            });
        }
        self.coins += self.autoclicker_rate;
        self.total_earned += self.autoclicker_rate;
        Ok(AutoclickerTick {
            active: true,
            coins: Some(self.coins),
            energy: Some(self.energy),
            total_earned: Some(self.total_earned),
            coins_earned: self.autoclicker_rate,
        })
    }

    fn check_booster_expiry(&mut self, _credential: &Credential) -> Result<ExpiryReport, ApiError> {
        self.expiry_checks += 1;
        Ok(ExpiryReport {
            warnings: self.warnings.clone(),
        })
    }
}
