use std::collections::VecDeque;

use crate::types::Sample;

/// Append-ordered sample buffer with window and capacity eviction.
///
/// Appends never scan. Age-based eviction happens in [`RollingWindow::prune`],
/// once per compute tick. The only work done at append time is the
/// capacity compaction, which drops the oldest half in one block.
#[derive(Debug)]
pub struct RollingWindow {
    /// Samples in arrival order.
    values: VecDeque<Sample>,

    /// Retention window.
    max_age_ms: u64,

    /// High-water mark that triggers compaction.
    capacity: usize,

    /// Set when a sample arrives with a timestamp older than its
    /// predecessor. Cleared only once the buffer is back in time order.
    out_of_order: bool,
}

impl RollingWindow {
    pub fn new(max_age_ms: u64, capacity: usize) -> Self {
        Self {
            values: VecDeque::new(),
            max_age_ms,
            capacity: capacity.max(2),
            out_of_order: false,
        }
    }

    /// Appends a sample. Returns how many samples compaction dropped.
    pub fn push(&mut self, sample: Sample) -> usize {
        if let Some(last) = self.values.back() {
            if sample.ts_ms < last.ts_ms {
                self.out_of_order = true;
            }
        }

        self.values.push_back(sample);

        if self.values.len() > self.capacity {
            let drop = self.values.len() / 2;
            self.values.drain(..drop);
            return drop;
        }
        0
    }

    /// Evicts samples older than `now - max_age_ms`. Returns the count removed.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.max_age_ms);
        let before = self.values.len();

        while let Some(front) = self.values.front() {
            if front.ts_ms < cutoff {
                self.values.pop_front();
            } else {
                break;
            }
        }

        // Late arrivals can sit behind a fresher head. A late sample that is
        // still inside the window keeps the flag up for later ticks.
        if self.out_of_order {
            self.values.retain(|s| s.ts_ms >= cutoff);
            self.out_of_order = !self.is_time_ordered();
        }

        before - self.values.len()
    }

    /// Copies out samples with `ts_ms >= now - lookback_ms`, in arrival order.
    pub fn since(&self, now_ms: u64, lookback_ms: u64) -> Vec<Sample> {
        let cutoff = now_ms.saturating_sub(lookback_ms);
        self.values
            .iter()
            .filter(|s| s.ts_ms >= cutoff)
            .copied()
            .collect()
    }

    /// Most recently appended sample.
    pub fn latest(&self) -> Option<Sample> {
        self.values.back().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.values.iter()
    }

    fn is_time_ordered(&self) -> bool {
        self.values
            .iter()
            .zip(self.values.iter().skip(1))
            .all(|(a, b)| a.ts_ms <= b.ts_ms)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Op {
        Push(u64),
        /// Advances `now` by this much, then prunes.
        Prune(u64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0..100_000u64).prop_map(Op::Push),
            1 => (0..20_000u64).prop_map(Op::Prune),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]
        #[test]
        fn every_prune_leaves_only_samples_inside_window(
            ops in prop::collection::vec(op(), 0..400),
            window in 1..50_000u64,
            capacity in 2..400usize,
        ) {
            let mut w = RollingWindow::new(window, capacity);
            let mut now = 0u64;

            for op in ops {
                match op {
                    Op::Push(t) => {
                        w.push(Sample::new(t, 1.0));
                        // --- INVARIANT: memory bounded by the high-water mark ---
                        prop_assert!(w.len() <= capacity);
                    }
                    Op::Prune(step) => {
                        now += step;
                        w.prune(now);

                        // --- INVARIANT: every survivor is inside the window ---
                        let cutoff = now.saturating_sub(window);
                        for s in w.iter() {
                            prop_assert!(s.ts_ms >= cutoff, "stale {} at now {}", s.ts_ms, now);
                        }
                    }
                }
            }
        }
    }
}
