//! Delayed impact measurement.
//!
//! Pending spikes sit in a min-heap keyed by due time; a single resolver
//! drains whatever is due instead of one timer per spike. Completed
//! measurements land in a bounded log.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use crate::pulse::spike::PendingSpike;
use crate::types::ImpactRecord;

/// Heap entry ordered by `(due_at, seq)`; `seq` keeps FIFO order between
/// spikes that fall due at the same millisecond.
#[derive(Debug)]
struct Scheduled {
    due_at: u64,
    seq: u64,
    spike: PendingSpike,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_at, self.seq).cmp(&(other.due_at, other.seq))
    }
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spike: PendingSpike) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled {
            due_at: spike.due_at,
            seq,
            spike,
        }));
    }

    /// Earliest due time, if anything is pending.
    pub fn next_due(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(s)| s.due_at)
    }

    /// Removes and returns every spike with `due_at <= now_ms`, earliest first.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<PendingSpike> {
        let mut due = Vec::new();
        while self.next_due().is_some_and(|t| t <= now_ms) {
            if let Some(Reverse(s)) = self.heap.pop() {
                due.push(s.spike);
            }
        }
        due
    }

    /// Empties the queue, returning what was still pending.
    pub fn drain(&mut self) -> Vec<PendingSpike> {
        let mut all: Vec<_> = std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(s)| s)
            .collect();
        // into_sorted_vec on Reverse yields latest first
        all.reverse();
        all.into_iter().map(|s| s.spike).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Fixed-capacity log of completed measurements, oldest first.
#[derive(Debug, Clone)]
pub struct ImpactLog {
    records: VecDeque<ImpactRecord>,
    capacity: usize,
}

impl ImpactLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: ImpactRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn all(&self) -> Vec<ImpactRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Percentage move from `reference` to `current`; 0 when the reference is
/// not a usable price.
pub fn realized_return_pct(reference: f64, current: f64) -> f64 {
    if reference <= 0.0 || !reference.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current - reference) / reference * 100.0
}

/// Turns a due spike into its record. Without a current price the
/// reference stands in, giving a 0% move.
pub fn measure(spike: &PendingSpike, current_price: Option<f64>, now_ms: u64) -> ImpactRecord {
    let exit_price = current_price.unwrap_or(spike.reference_price);
    ImpactRecord {
        instrument: spike.instrument.clone(),
        ts_ms: spike.detected_at,
        z_info_at_spike: spike.z_info_at_spike,
        reference_price: spike.reference_price,
        exit_price,
        realized_return_pct: realized_return_pct(spike.reference_price, exit_price),
        resolved_at: now_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Instrument;
    use common::logger::TraceId;

    fn spike(instrument: &str, detected_at: u64, due_at: u64) -> PendingSpike {
        PendingSpike {
            id: TraceId::new(),
            instrument: Instrument::new(instrument),
            detected_at,
            z_info_at_spike: 2.5,
            reference_price: 100.0,
            due_at,
        }
    }

    fn record(ts_ms: u64) -> ImpactRecord {
        measure(&spike("BTC", ts_ms, ts_ms + 60_000), Some(101.0), ts_ms + 60_000)
    }

    #[test]
    fn queue_pops_only_due_spikes_in_due_order() {
        let mut q = PendingQueue::new();
        q.push(spike("ETH", 10, 70_010));
        q.push(spike("BTC", 0, 60_000));
        q.push(spike("SOL", 20, 60_000));

        assert_eq!(q.next_due(), Some(60_000));
        assert!(q.pop_due(59_999).is_empty());

        let due = q.pop_due(60_000);
        let names: Vec<_> = due.iter().map(|s| s.instrument.id()).collect();
        assert_eq!(names, vec!["BTC", "SOL"]);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_due(), Some(70_010));
    }

    #[test]
    fn drain_returns_everything_earliest_first() {
        let mut q = PendingQueue::new();
        q.push(spike("B", 0, 200));
        q.push(spike("A", 0, 100));

        let all = q.drain();
        assert_eq!(all[0].instrument.id(), "A");
        assert_eq!(all[1].instrument.id(), "B");
        assert!(q.is_empty());
    }

    #[test]
    fn realized_return_three_percent() {
        let r = measure(&spike("BTC", 0, 60_000), Some(103.0), 60_000);
        assert!((r.realized_return_pct - 3.0).abs() < 1e-9);
        assert_eq!(format!("{:.3}", r.realized_return_pct), "3.000");
        assert_eq!(r.exit_price, 103.0);
    }

    #[test]
    fn missing_price_falls_back_to_reference() {
        let r = measure(&spike("BTC", 0, 60_000), None, 60_000);
        assert_eq!(r.realized_return_pct, 0.0);
        assert_eq!(r.exit_price, 100.0);
    }

    #[test]
    fn zero_reference_is_guarded() {
        assert_eq!(realized_return_pct(0.0, 105.0), 0.0);
        assert_eq!(realized_return_pct(f64::NAN, 105.0), 0.0);
    }

    #[test]
    fn log_keeps_last_capacity_records_oldest_first() {
        let mut log = ImpactLog::new(10);
        for i in 0..15 {
            log.push(record(i * 1_000));
        }

        assert_eq!(log.len(), 10);
        let ts: Vec<u64> = log.all().iter().map(|r| r.ts_ms).collect();
        assert_eq!(ts, (5..15).map(|i| i * 1_000).collect::<Vec<_>>());
    }
}
