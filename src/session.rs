//! The per-player session: one owned context tying the tap engine, sync
//! batcher, scheduler, autoclicker poller and expiry watchdog together.
//!
//! Everything runs on the caller's thread. The host drives time by calling
//! [`Session::update`] (every animation frame, or from a coarse timer) and
//! performs network calls on the session's behalf:
//!
//! ```
//! use tap_sync::{Credential, ManualClock, PlayerSnapshot, Session, SessionConfig, TapPosition};
//!
//! let clock = ManualClock::new(0);
//! let mut session = Session::new(
//!     SessionConfig::default(),
//!     clock.clone(),
//!     Credential::new("query_id=..."),
//!     PlayerSnapshot::default(),
//! )
//! .unwrap();
//!
//! session.tap(TapPosition::default());
//! clock.advance(500);
//! session.update();
//!
//! for request in session.take_requests() {
//!     // send request.call to the server, then feed the reply back with
//!     // session.complete_raw(request.ticket, Ok(body))
//!     let _ = request;
//! }
//! ```

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;

use crate::api::{
    AutoclickerTick, Backend, Call, CallKind, Credential, ExpiryReport, PlayerSnapshot, Request,
    TapReceipt, Ticket, UpgradeReceipt,
};
use crate::autoclicker::{AutoclickerPoller, PollerState};
use crate::boosters::{BoosterKind, BoosterState};
use crate::config::SessionConfig;
use crate::error::{ApiError, CompletionError, ConfigError, SaveError};
use crate::events::{ActivityLog, Observers, SessionEvent, SubscriptionId, TapPosition};
use crate::expiry::{BoosterWarning, ExpiryWatchdog};
use crate::regen::regenerate;
use crate::save::{self, PendingSave, Storage};
use crate::scheduler::{Scheduler, TaskKind};
use crate::state::{Balance, Ledger, PlayerState, TapRecord};
use crate::sync::{FlushTrigger, SyncBatcher};
use crate::tap::{TapEngine, TapOutcome};
use crate::time::{Clock, Millis, SystemClock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    /// Periodic tasks paused (page hidden). Taps are still accepted.
    Suspended,
    /// Final. Only the last flush may still complete.
    TornDown,
}

pub struct Session<C: Clock = SystemClock> {
    config: SessionConfig,
    clock: C,
    credential: Credential,
    state: PlayerState,
    engine: TapEngine,
    batcher: SyncBatcher,
    scheduler: Scheduler,
    poller: AutoclickerPoller,
    watchdog: ExpiryWatchdog,
    outbox: Vec<Request>,
    issued: BTreeMap<Ticket, CallKind>,
    next_ticket: u64,
    lifecycle: Lifecycle,
    observers: Observers,
    log: ActivityLog,
}

impl<C: Clock> Session<C> {
    /// Start a session from the player record returned at login.
    ///
    /// Regeneration and the expiry watchdog start immediately; the first
    /// expiry check (local scan plus a queued remote check) runs here, and
    /// the autoclicker poller starts if that booster is active.
    pub fn new(
        config: SessionConfig,
        clock: C,
        credential: Credential,
        snapshot: PlayerSnapshot,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now_ms();

        let mut session = Self {
            engine: TapEngine::new(config.first_tap_interval_ms),
            batcher: SyncBatcher::new(&config),
            scheduler: Scheduler::new(&config),
            poller: AutoclickerPoller::new(),
            watchdog: ExpiryWatchdog::new(&config),
            state: PlayerState::from_snapshot(snapshot),
            config,
            clock,
            credential,
            outbox: Vec::new(),
            issued: BTreeMap::new(),
            next_ticket: 1,
            lifecycle: Lifecycle::Running,
            observers: Observers::default(),
            log: ActivityLog::default(),
        };

        session.scheduler.start(TaskKind::Regeneration, now);
        session.scheduler.start(TaskKind::ExpiryCheck, now);
        session.follow_autoclicker(now);
        session.check_expiry(now);
        info!(
            "session started: {} coins, {}/{} energy",
            session.state.coins, session.state.energy, session.state.max_energy
        );
        Ok(session)
    }

    // ---- accessors ----

    /// Swap in fresh init data, e.g. after the backend answered 401. Batches
    /// already handed to the host keep the credential they were issued with.
    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = credential;
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn balance(&self) -> Balance {
        Balance::of(&self.state)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Taps accepted locally and not yet sent.
    pub fn pending_taps(&self) -> usize {
        self.batcher.pending_len()
    }

    /// Taps in the batch currently awaiting a server reply.
    pub fn in_flight_taps(&self) -> usize {
        self.batcher.in_flight_len()
    }

    pub fn pending_records(&self) -> impl Iterator<Item = &TapRecord> {
        self.batcher.pending()
    }

    pub fn is_flushing(&self) -> bool {
        self.batcher.is_flushing()
    }

    pub fn autoclicker_state(&self) -> PollerState {
        self.poller.state()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&SessionEvent) + 'static,
    ) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // ---- player input and time ----

    /// Apply one tap. Never blocks; a flush it triggers is only queued.
    pub fn tap(&mut self, position: TapPosition) -> TapOutcome {
        if self.lifecycle == Lifecycle::TornDown {
            debug!("tap ignored after teardown");
            return TapOutcome::rejected();
        }
        let now = self.clock.now_ms();

        match self.engine.tap(&mut self.state, now) {
            Ok(record) => {
                let rewarded = record.reward;
                self.batcher.push(record);
                self.emit(SessionEvent::Tapped { position, rewarded });
                self.emit_balance();
                self.maybe_flush(now);
                TapOutcome {
                    accepted: true,
                    rewarded,
                }
            }
            Err(e) => {
                self.emit(SessionEvent::InsufficientEnergy {
                    required: e.required,
                    available: e.available,
                });
                TapOutcome::rejected()
            }
        }
    }

    /// Advance periodic work to the clock's current time.
    pub fn update(&mut self) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        let now = self.clock.now_ms();

        // Before polling, so an autoclicker that ran out between ticks
        // costs no extra request.
        self.follow_autoclicker(now);

        for (task, ticks) in self.scheduler.due(now) {
            match task {
                TaskKind::Regeneration => {
                    let gained = regenerate(&mut self.state, ticks, self.config.regen_per_tick, now);
                    if gained > 0 {
                        self.emit_balance();
                    }
                }
                TaskKind::AutoclickerPoll => {
                    if self.poller.should_poll() {
                        let ticket = self.allocate_ticket();
                        let expires_at = self.autoclicker_expiry().unwrap_or(0);
                        self.poller.begin_poll(ticket, expires_at);
                        self.issue(ticket, Call::PollAutoclicker);
                    }
                }
                TaskKind::ExpiryCheck => self.check_expiry(now),
            }
        }

        self.maybe_flush(now);
    }

    /// Flush now regardless of threshold, debounce or backoff. Returns
    /// whether a batch was queued.
    pub fn force_flush(&mut self) -> bool {
        if self.lifecycle == Lifecycle::TornDown {
            return false;
        }
        self.start_flush(FlushTrigger::Forced)
    }

    /// Page hidden: send what is pending and pause periodic tasks. Taps
    /// queued behind a flush already in flight follow once it succeeds.
    pub fn suspend(&mut self) {
        if self.lifecycle != Lifecycle::Running {
            return;
        }
        self.start_flush(FlushTrigger::Forced);
        self.scheduler.pause();
        self.lifecycle = Lifecycle::Suspended;
        debug!("session suspended with {} pending taps", self.pending_taps());
    }

    /// Page visible again. Tasks restart from now; the hidden interval
    /// produces no ticks.
    pub fn resume(&mut self) {
        if self.lifecycle != Lifecycle::Suspended {
            return;
        }
        let now = self.clock.now_ms();
        self.lifecycle = Lifecycle::Running;
        self.scheduler.resume(now);
        self.follow_autoclicker(now);
        self.check_expiry(now);
        debug!("session resumed");
    }

    /// End the session: queue a final flush and cancel everything else.
    /// Queued polls and expiry checks are withdrawn; the final flush may
    /// still be completed, but a failure is not retried.
    pub fn teardown(&mut self) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        self.start_flush(FlushTrigger::Forced);
        self.scheduler.cancel();
        if self.poller.stop().is_some() {
            self.emit(SessionEvent::AutoclickerStopped);
        }

        let (keep, withdrawn): (Vec<_>, Vec<_>) = std::mem::take(&mut self.outbox)
            .into_iter()
            .partition(|r| r.call.kind() == CallKind::SubmitTaps);
        self.outbox = keep;
        for request in withdrawn {
            self.issued.remove(&request.ticket);
            self.poller.finish(request.ticket);
            self.watchdog.finish_check(request.ticket);
        }

        self.lifecycle = Lifecycle::TornDown;
        info!(
            "session torn down ({} taps in flight, {} pending)",
            self.in_flight_taps(),
            self.pending_taps()
        );
    }

    // ---- collaborator traffic ----

    /// Requests queued since the last call, oldest first.
    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.outbox)
    }

    pub fn complete_flush(
        &mut self,
        ticket: Ticket,
        result: Result<TapReceipt, ApiError>,
    ) -> Result<(), CompletionError> {
        self.claim(ticket, CallKind::SubmitTaps)?;
        let now = self.clock.now_ms();

        match result {
            Ok(receipt) => {
                let taps = self.batcher.finish_success(ticket).unwrap_or(0);
                self.state
                    .reconcile(receipt.ledger(), self.batcher.pending_reward());
                if receipt.league.is_some() {
                    self.state.league = receipt.league;
                }
                debug!("synced {taps} taps, server coins {}", receipt.coins);
                self.emit(SessionEvent::Synced { taps });
                self.emit_balance();

                if self.lifecycle != Lifecycle::Running {
                    // Suspended or torn down: taps that queued behind the
                    // forced flush go out too, the host may not tick again.
                    self.start_flush(FlushTrigger::Forced);
                } else {
                    self.maybe_flush(now);
                }
            }
            Err(err) if err.is_transient() => {
                let requeued = self.batcher.finish_failure(ticket, now).unwrap_or(0);
                warn!(
                    "flush of {requeued} taps failed ({err}), {} pending (attempt {})",
                    self.pending_taps(),
                    self.batcher.failures()
                );
                self.emit(SessionEvent::SyncPending {
                    pending_taps: self.pending_taps(),
                });
            }
            Err(err) => {
                let dropped = self.batcher.finish_rejected(ticket).unwrap_or_default();
                let reward: u64 = dropped.iter().map(|r| r.reward).sum();
                self.state.debit(reward);
                warn!(
                    "server rejected {} taps ({err}); {reward} coins rolled back",
                    dropped.len()
                );
                self.emit(SessionEvent::BatchRejected {
                    taps: dropped.len(),
                    reason: err.to_string(),
                });
                self.emit_balance();
            }
        }
        Ok(())
    }

    pub fn complete_autoclicker_poll(
        &mut self,
        ticket: Ticket,
        result: Result<AutoclickerTick, ApiError>,
    ) -> Result<(), CompletionError> {
        self.claim(ticket, CallKind::PollAutoclicker)?;
        let polled_expiry = self.poller.finish(ticket);
        let now = self.clock.now_ms();

        let tick = match result {
            Ok(tick) => tick,
            Err(err) => {
                // Skipped; the next tick polls again.
                warn!("autoclicker poll failed: {err}");
                return Ok(());
            }
        };

        if let Some(ledger) = tick.ledger() {
            self.reconcile(ledger);
            if tick.coins_earned > 0 {
                self.emit(SessionEvent::AutoclickerEarned {
                    coins: tick.coins_earned,
                });
            }
        }
        if !tick.active {
            // Only the booster this poll was sent for may be switched off.
            if polled_expiry.is_some() && self.autoclicker_expiry() == polled_expiry {
                self.state.boosters.mark_inactive(&BoosterKind::Autoclicker);
                self.follow_autoclicker(now);
            } else {
                debug!("stale autoclicker reply ignored, booster was replaced");
            }
        }
        Ok(())
    }

    pub fn complete_expiry_check(
        &mut self,
        ticket: Ticket,
        result: Result<ExpiryReport, ApiError>,
    ) -> Result<(), CompletionError> {
        self.claim(ticket, CallKind::CheckBoosterExpiry)?;
        self.watchdog.finish_check(ticket);
        let now = self.clock.now_ms();

        match result {
            Ok(report) => {
                for warning in report.warnings {
                    self.raise_warning(warning.into(), now);
                }
            }
            Err(err) => warn!("booster expiry check failed: {err}"),
        }
        Ok(())
    }

    /// Complete any request from a raw HTTP outcome: the response body on a
    /// 2xx, or the transport/status error. Undecodable bodies count as
    /// transient failures.
    pub fn complete_raw(
        &mut self,
        ticket: Ticket,
        response: Result<&str, ApiError>,
    ) -> Result<(), CompletionError> {
        let kind = *self
            .issued
            .get(&ticket)
            .ok_or(CompletionError::UnknownTicket(ticket))?;
        match kind {
            CallKind::SubmitTaps => self.complete_flush(ticket, decode(response)),
            CallKind::PollAutoclicker => self.complete_autoclicker_poll(ticket, decode(response)),
            CallKind::CheckBoosterExpiry => self.complete_expiry_check(ticket, decode(response)),
        }
    }

    /// Send every queued request through a blocking backend and complete
    /// it, until nothing is left. Returns the number of calls made.
    pub fn pump(&mut self, backend: &mut impl Backend) -> usize {
        let mut calls = 0;
        loop {
            let requests = self.take_requests();
            if requests.is_empty() {
                return calls;
            }
            for request in requests {
                calls += 1;
                let Request {
                    ticket,
                    credential,
                    call,
                } = request;
                let completed = match call {
                    Call::SubmitTaps(batch) => {
                        let result = backend.submit_taps(&credential, &batch);
                        self.complete_flush(ticket, result)
                    }
                    Call::PollAutoclicker => {
                        let result = backend.poll_autoclicker(&credential);
                        self.complete_autoclicker_poll(ticket, result)
                    }
                    Call::CheckBoosterExpiry => {
                        let result = backend.check_booster_expiry(&credential);
                        self.complete_expiry_check(ticket, result)
                    }
                };
                if let Err(e) = completed {
                    warn!("dropping reply: {e}");
                }
            }
        }
    }

    // ---- authoritative side channels ----

    /// Booster activation reply: the full boosters map.
    pub fn apply_boosters(&mut self, boosters: BTreeMap<BoosterKind, BoosterState>) {
        let now = self.clock.now_ms();
        self.state.boosters.replace_all(boosters);
        if self.lifecycle != Lifecycle::TornDown {
            self.follow_autoclicker(now);
            self.scan_boosters(now);
        }
    }

    /// Tap-power or stamina purchase reply.
    pub fn apply_upgrade(&mut self, receipt: UpgradeReceipt) {
        self.state.coins = receipt
            .coins
            .saturating_add(self.batcher.unacknowledged_reward());
        if let Some(tap_power) = receipt.tap_power {
            self.state.tap_power = tap_power;
        }
        if let Some(max_energy) = receipt.max_energy {
            self.state.max_energy = max_energy;
        }
        self.state.restore_invariants();
        self.emit_balance();
    }

    /// Replace the whole player record, then re-apply taps the server has
    /// not acknowledged.
    pub fn apply_snapshot(&mut self, snapshot: PlayerSnapshot) {
        let now = self.clock.now_ms();
        let ledger = Ledger {
            coins: snapshot.coins,
            energy: snapshot.energy,
            total_earned: snapshot.total_earned,
        };
        let unacknowledged = self.batcher.unacknowledged_reward();
        self.state = PlayerState::from_snapshot(snapshot);
        self.state.reconcile(ledger, unacknowledged);
        self.emit_balance();
        if self.lifecycle != Lifecycle::TornDown {
            self.follow_autoclicker(now);
        }
    }

    // ---- persistence ----

    /// Save unsent taps and the warning dedup table. The batch in flight is
    /// not included, so a reload can never send a tap twice.
    pub fn persist(&self, storage: &mut impl Storage) -> Result<(), SaveError> {
        let pending = PendingSave {
            taps: self.batcher.pending().cloned().collect(),
            warnings: self.watchdog.shown().clone(),
        };
        if pending == PendingSave::default() {
            return save::clear(storage);
        }
        save::write(storage, &pending)?;
        debug!("persisted {} pending taps", pending.taps.len());
        Ok(())
    }

    /// Pick up taps saved by a previous session. Their rewards are applied
    /// on top of the current (fresh) state; the save is cleared so they are
    /// only restored once. Returns how many taps were restored.
    pub fn restore(&mut self, storage: &mut impl Storage) -> Result<usize, SaveError> {
        let Some(pending) = save::read(storage)? else {
            return Ok(0);
        };
        save::clear(storage)?;
        let now = self.clock.now_ms();

        self.watchdog.restore_shown(pending.warnings, now);
        let restored = pending.taps.len();
        if restored == 0 {
            return Ok(0);
        }
        let reward: u64 = pending.taps.iter().map(|r| r.reward).sum();
        self.state.credit(reward);
        self.state.spend_energy(reward);
        self.batcher.restore(pending.taps);
        info!("restored {restored} unsynced taps");
        self.emit_balance();
        if self.lifecycle != Lifecycle::TornDown {
            self.maybe_flush(now);
        }
        Ok(restored)
    }

    // ---- internals ----

    fn allocate_ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    fn issue(&mut self, ticket: Ticket, call: Call) {
        self.issued.insert(ticket, call.kind());
        self.outbox.push(Request {
            ticket,
            credential: self.credential.clone(),
            call,
        });
    }

    /// Retire an issued ticket, checking it was issued for `completed`.
    fn claim(&mut self, ticket: Ticket, completed: CallKind) -> Result<(), CompletionError> {
        match self.issued.get(&ticket) {
            None => Err(CompletionError::UnknownTicket(ticket)),
            Some(&issued) if issued != completed => Err(CompletionError::MismatchedCall {
                ticket,
                issued,
                completed,
            }),
            Some(_) => {
                self.issued.remove(&ticket);
                self.outbox.retain(|r| r.ticket != ticket);
                Ok(())
            }
        }
    }

    fn maybe_flush(&mut self, now: Millis) {
        if let Some(trigger) = self.batcher.should_flush(now) {
            self.start_flush(trigger);
        }
    }

    fn start_flush(&mut self, trigger: FlushTrigger) -> bool {
        let ticket = Ticket(self.next_ticket);
        let Some(batch) = self.batcher.begin_flush(ticket) else {
            return false;
        };
        self.next_ticket += 1;
        debug!(
            "flushing {} taps ({trigger:?}), avg interval {:.0} ms",
            batch.total_taps, batch.avg_interval_ms
        );
        self.issue(ticket, Call::SubmitTaps(batch));
        true
    }

    fn reconcile(&mut self, ledger: Ledger) {
        self.state
            .reconcile(ledger, self.batcher.unacknowledged_reward());
        self.emit_balance();
    }

    fn autoclicker_expiry(&self) -> Option<Millis> {
        self.state
            .boosters
            .get(&BoosterKind::Autoclicker)
            .map(|b| b.expires_at)
    }

    fn follow_autoclicker(&mut self, now: Millis) {
        let active = self.state.boosters.is_active(&BoosterKind::Autoclicker, now);
        match self.poller.observe(active) {
            Some(PollerState::Polling) => {
                info!(
                    "autoclicker active, polling every {} ms",
                    self.scheduler.period_ms(TaskKind::AutoclickerPoll)
                );
                self.scheduler.start(TaskKind::AutoclickerPoll, now);
                self.emit(SessionEvent::AutoclickerStarted);
            }
            Some(PollerState::Idle) => {
                info!("autoclicker inactive, polling stopped");
                self.scheduler.stop(TaskKind::AutoclickerPoll);
                self.emit(SessionEvent::AutoclickerStopped);
            }
            None => {}
        }
    }

    fn check_expiry(&mut self, now: Millis) {
        self.scan_boosters(now);
        if !self.watchdog.is_checking() {
            let ticket = self.allocate_ticket();
            self.watchdog.begin_check(ticket);
            self.issue(ticket, Call::CheckBoosterExpiry);
        }
    }

    fn scan_boosters(&mut self, now: Millis) {
        for warning in self.watchdog.scan(&self.state.boosters, now) {
            self.raise_warning(warning, now);
        }
    }

    fn raise_warning(&mut self, warning: BoosterWarning, now: Millis) {
        if self.watchdog.admit(&warning, now) {
            info!("{}", warning.message);
            self.emit(SessionEvent::BoosterExpiring(warning));
        }
    }

    fn emit_balance(&mut self) {
        self.emit(SessionEvent::StateChanged(Balance::of(&self.state)));
    }

    fn emit(&mut self, event: SessionEvent) {
        if let Some((text, is_important)) = event.log_line() {
            self.log.add_log(&text, is_important);
        }
        self.observers.notify(&event);
    }
}

impl<C: Clock> Drop for Session<C> {
    fn drop(&mut self) {
        let unsynced = self.pending_taps() + self.in_flight_taps();
        if unsynced > 0 {
            warn!("session dropped with {unsynced} unsynced taps");
        }
    }
}

fn decode<T: DeserializeOwned>(response: Result<&str, ApiError>) -> Result<T, ApiError> {
    serde_json::from_str(response?).map_err(|e| ApiError::Decode(e.to_string()))
}
