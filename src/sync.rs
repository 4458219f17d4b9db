//! Sync batcher: owns tap records from the moment they are accepted until
//! the server has counted them.
//!
//! Records live in exactly one of two places: the live queue, or the single
//! in-flight snapshot. Starting a flush moves the whole live queue into the
//! snapshot; a failed flush moves the snapshot back in front of whatever was
//! queued meanwhile. Nothing is ever copied, so nothing can be sent twice.
//!
//! Records restored from an earlier session predate anything in flight. While
//! a flush is running they are held back and rejoin the front of the live
//! queue once that flush resolves, so batches reach the server oldest first.

use std::collections::VecDeque;

use crate::api::{SyncBatch, Ticket};
use crate::config::SessionConfig;
use crate::state::TapRecord;
use crate::time::Millis;

/// Why a flush was started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The queue reached the configured length.
    Threshold,
    /// The oldest record waited longer than the debounce interval.
    Debounce,
    /// Requested by the host (suspend, explicit call).
    Forced,
}

#[derive(Clone, Debug)]
struct InFlight {
    ticket: Ticket,
    records: VecDeque<TapRecord>,
}

/// Exponential hold-off applied to automatic triggers after failures.
#[derive(Clone, Debug)]
struct Backoff {
    base_ms: Millis,
    max_ms: Millis,
    failures: u32,
    retry_at: Option<Millis>,
}

impl Backoff {
    fn delay_ms(&self) -> Millis {
        let shift = self.failures.saturating_sub(1).min(20);
        self.base_ms.saturating_mul(1 << shift).min(self.max_ms)
    }

    fn record_failure(&mut self, now: Millis) {
        self.failures += 1;
        self.retry_at = Some(now.saturating_add(self.delay_ms()));
    }

    fn clear(&mut self) {
        self.failures = 0;
        self.retry_at = None;
    }

    fn holds(&self, now: Millis) -> bool {
        self.retry_at.is_some_and(|at| now < at)
    }
}

#[derive(Clone, Debug)]
pub struct SyncBatcher {
    queue: VecDeque<TapRecord>,
    /// Restored while a flush was in flight; always empty otherwise.
    held: VecDeque<TapRecord>,
    in_flight: Option<InFlight>,
    threshold: usize,
    debounce_ms: Millis,
    backoff: Backoff,
}

impl SyncBatcher {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            held: VecDeque::new(),
            in_flight: None,
            threshold: config.flush_threshold.max(1),
            debounce_ms: config.flush_debounce_ms,
            backoff: Backoff {
                base_ms: config.retry_backoff_base_ms,
                max_ms: config.retry_backoff_max_ms,
                failures: 0,
                retry_at: None,
            },
        }
    }

    pub fn push(&mut self, record: TapRecord) {
        self.queue.push_back(record);
    }

    /// Put previously persisted records in front of the live queue, or hold
    /// them back until the running flush resolves.
    pub fn restore(&mut self, records: Vec<TapRecord>) {
        let mut restored: VecDeque<TapRecord> = records.into();
        if self.in_flight.is_some() {
            restored.append(&mut self.held);
            self.held = restored;
        } else {
            restored.append(&mut self.queue);
            self.queue = restored;
        }
    }

    fn release_held(&mut self) {
        if !self.held.is_empty() {
            self.held.append(&mut self.queue);
            self.queue = std::mem::take(&mut self.held);
        }
    }

    /// Records not in flight, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &TapRecord> {
        self.held.iter().chain(self.queue.iter())
    }

    pub fn pending_len(&self) -> usize {
        self.held.len() + self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.as_ref().map_or(0, |f| f.records.len())
    }

    pub fn in_flight_ticket(&self) -> Option<Ticket> {
        self.in_flight.as_ref().map(|f| f.ticket)
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Consecutive failed flushes since the last success.
    pub fn failures(&self) -> u32 {
        self.backoff.failures
    }

    /// Coins applied locally by queued records.
    pub fn pending_reward(&self) -> u64 {
        self.pending().map(|r| r.reward).sum()
    }

    /// Coins applied locally that no server reply has accounted for yet.
    pub fn unacknowledged_reward(&self) -> u64 {
        let in_flight: u64 = self
            .in_flight
            .iter()
            .flat_map(|f| f.records.iter())
            .map(|r| r.reward)
            .sum();
        in_flight + self.pending_reward()
    }

    /// Automatic trigger due at `now`, if any.
    pub fn should_flush(&self, now: Millis) -> Option<FlushTrigger> {
        if self.in_flight.is_some() || self.backoff.holds(now) {
            return None;
        }
        let oldest = self.queue.front()?;
        if self.queue.len() >= self.threshold {
            Some(FlushTrigger::Threshold)
        } else if now.saturating_sub(oldest.timestamp) >= self.debounce_ms {
            Some(FlushTrigger::Debounce)
        } else {
            None
        }
    }

    /// Move the live queue into the in-flight snapshot and aggregate it.
    /// None if a flush is already running or there is nothing to send.
    pub fn begin_flush(&mut self, ticket: Ticket) -> Option<SyncBatch> {
        if self.in_flight.is_some() {
            return None;
        }
        let batch = SyncBatch::from_records(&self.queue)?;
        let records = std::mem::take(&mut self.queue);
        self.in_flight = Some(InFlight { ticket, records });
        Some(batch)
    }

    fn take_in_flight(&mut self, ticket: Ticket) -> Option<VecDeque<TapRecord>> {
        match &self.in_flight {
            Some(f) if f.ticket == ticket => self.in_flight.take().map(|f| f.records),
            _ => None,
        }
    }

    /// The server counted the snapshot. Returns how many records it held.
    pub fn finish_success(&mut self, ticket: Ticket) -> Option<usize> {
        let records = self.take_in_flight(ticket)?;
        self.backoff.clear();
        self.release_held();
        Some(records.len())
    }

    /// Transient failure: the snapshot goes back in front, in order.
    /// Returns how many records were requeued.
    pub fn finish_failure(&mut self, ticket: Ticket, now: Millis) -> Option<usize> {
        let mut records = self.take_in_flight(ticket)?;
        let requeued = records.len();
        records.append(&mut self.queue);
        self.queue = records;
        self.release_held();
        self.backoff.record_failure(now);
        Some(requeued)
    }

    /// The server refused the snapshot; it is dropped and handed back so the
    /// caller can undo its local effect.
    pub fn finish_rejected(&mut self, ticket: Ticket) -> Option<Vec<TapRecord>> {
        let records = self.take_in_flight(ticket)?;
        self.backoff.clear();
        self.release_held();
        Some(records.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: Millis) -> TapRecord {
        TapRecord {
            count: 1,
            interval_ms: 100,
            timestamp,
            reward: 1,
        }
    }

    fn batcher() -> SyncBatcher {
        SyncBatcher::new(&SessionConfig::default())
    }

    fn timestamps(b: &SyncBatcher) -> Vec<Millis> {
        b.pending().map(|r| r.timestamp).collect()
    }

    #[test]
    fn empty_queue_never_flushes() {
        let b = batcher();
        assert_eq!(b.should_flush(1_000_000), None);
    }

    #[test]
    fn threshold_triggers_flush() {
        let mut b = batcher();
        for t in 0..9 {
            b.push(record(t));
        }
        assert_eq!(b.should_flush(9), None);
        b.push(record(9));
        assert_eq!(b.should_flush(9), Some(FlushTrigger::Threshold));
    }

    #[test]
    fn debounce_measured_from_oldest_record() {
        let mut b = batcher();
        b.push(record(1_000));
        b.push(record(1_400));
        assert_eq!(b.should_flush(1_499), None);
        assert_eq!(b.should_flush(1_500), Some(FlushTrigger::Debounce));
    }

    #[test]
    fn taps_during_flight_wait_for_next_flush() {
        let mut b = batcher();
        for t in 0..10 {
            b.push(record(t));
        }
        let batch = b.begin_flush(Ticket(1)).unwrap();
        assert_eq!(batch.total_taps, 10);
        b.push(record(10));
        b.push(record(11));
        assert_eq!(b.in_flight_len(), 10);
        assert_eq!(b.pending_len(), 2);
        assert_eq!(b.should_flush(100_000), None);
        assert_eq!(b.begin_flush(Ticket(2)), None);
    }

    #[test]
    fn failure_prepends_snapshot_in_order() {
        let mut b = batcher();
        for t in 0..10 {
            b.push(record(t));
        }
        b.begin_flush(Ticket(1)).unwrap();
        for t in 10..13 {
            b.push(record(t));
        }
        assert_eq!(b.finish_failure(Ticket(1), 50), Some(10));
        assert_eq!(timestamps(&b), (0..13).collect::<Vec<_>>());
        assert!(!b.is_flushing());
    }

    #[test]
    fn success_discards_snapshot_only() {
        let mut b = batcher();
        b.push(record(0));
        b.begin_flush(Ticket(1)).unwrap();
        b.push(record(1));
        assert_eq!(b.finish_success(Ticket(1)), Some(1));
        assert_eq!(timestamps(&b), vec![1]);
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let mut b = batcher();
        b.push(record(0));
        b.begin_flush(Ticket(7)).unwrap();
        assert_eq!(b.finish_success(Ticket(6)), None);
        assert_eq!(b.finish_failure(Ticket(6), 0), None);
        assert!(b.is_flushing());
    }

    #[test]
    fn rejection_drops_snapshot() {
        let mut b = batcher();
        b.push(record(0));
        b.push(record(1));
        b.begin_flush(Ticket(1)).unwrap();
        b.push(record(2));
        let dropped = b.finish_rejected(Ticket(1)).unwrap();
        assert_eq!(dropped.len(), 2);
        assert_eq!(timestamps(&b), vec![2]);
    }

    #[test]
    fn failure_holds_automatic_triggers_with_growing_backoff() {
        let mut b = batcher();
        b.push(record(0));
        b.begin_flush(Ticket(1)).unwrap();
        b.finish_failure(Ticket(1), 1_000);
        assert_eq!(b.should_flush(1_999), None);
        assert_eq!(b.should_flush(2_000), Some(FlushTrigger::Debounce));

        b.begin_flush(Ticket(2)).unwrap();
        b.finish_failure(Ticket(2), 2_000);
        assert_eq!(b.failures(), 2);
        assert_eq!(b.should_flush(3_999), None);
        assert_eq!(b.should_flush(4_000), Some(FlushTrigger::Debounce));

        b.begin_flush(Ticket(3)).unwrap();
        b.finish_success(Ticket(3));
        assert_eq!(b.failures(), 0);
    }

    #[test]
    fn backoff_is_capped() {
        let mut b = batcher();
        b.push(record(0));
        for n in 1..=20 {
            b.begin_flush(Ticket(n)).unwrap();
            b.finish_failure(Ticket(n), 0);
        }
        assert_eq!(b.should_flush(29_999), None);
        assert_eq!(b.should_flush(30_000), Some(FlushTrigger::Debounce));
    }

    #[test]
    fn restore_goes_in_front() {
        let mut b = batcher();
        b.push(record(5));
        b.restore(vec![record(1), record(2)]);
        assert_eq!(timestamps(&b), vec![1, 2, 5]);
    }

    #[test]
    fn restore_during_flight_keeps_oldest_first() {
        let mut b = batcher();
        b.push(record(10));
        b.begin_flush(Ticket(1)).unwrap();
        b.push(record(20));
        b.restore(vec![record(1), record(2)]);
        assert_eq!(b.pending_len(), 3);
        assert_eq!(b.pending_reward(), 3);
        assert_eq!(timestamps(&b), vec![1, 2, 20]);

        // A failed snapshot still goes out after the restored records.
        b.finish_failure(Ticket(1), 0);
        assert_eq!(timestamps(&b), vec![1, 2, 10, 20]);

        let batch = b.begin_flush(Ticket(2)).unwrap();
        assert_eq!(batch.total_taps, 4);
        b.restore(vec![record(0)]);
        b.finish_success(Ticket(2));
        assert_eq!(timestamps(&b), vec![0]);
    }

    #[test]
    fn unacknowledged_reward_counts_both_places() {
        let mut b = batcher();
        b.push(record(0));
        b.push(record(1));
        b.begin_flush(Ticket(1)).unwrap();
        b.push(record(2));
        assert_eq!(b.pending_reward(), 1);
        assert_eq!(b.unacknowledged_reward(), 3);
    }
}
