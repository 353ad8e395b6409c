//! # Pool counters and snapshots.
//!
//! Live counters are [`AtomicCounter`]s owned by each worker slot and by the
//! pool; [`TaskPool::metrics`](super::TaskPool::metrics) copies them into plain
//! [`PoolMetrics`] values.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use crate::primitives::AtomicCounter;

/// Live per-worker counters.
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    pub processed: AtomicCounter,
    pub steals: AtomicCounter,
    pub stolen_items: AtomicCounter,
    pub failed: AtomicCounter,
    pub panicked: AtomicCounter,
    pub timed_out: AtomicCounter,
    /// Consecutive rotations that found no work.
    pub idle_streak: AtomicU64,
    /// Currently executing an item.
    pub busy: AtomicBool,
}

impl WorkerStats {
    pub fn idle_streak(&self) -> u64 {
        self.idle_streak.load(Ordering::Relaxed)
    }

    pub fn mark_idle(&self) {
        self.idle_streak.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_found_work(&self) {
        self.idle_streak.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self, id: usize, deque_len: usize) -> WorkerMetrics {
        WorkerMetrics {
            id,
            processed: self.processed.get(),
            steals: self.steals.get(),
            stolen_items: self.stolen_items.get(),
            failed: self.failed.get(),
            panicked: self.panicked.get(),
            timed_out: self.timed_out.get(),
            idle_rotations: self.idle_streak(),
            busy: self.busy.load(Ordering::Relaxed),
            deque_len,
        }
    }
}

/// Point-in-time counters of one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerMetrics {
    /// Worker id (stable for the worker's lifetime, never reused).
    pub id: usize,
    /// Items executed, whatever their outcome.
    pub processed: u64,
    /// Successful steal operations.
    pub steals: u64,
    /// Items obtained through steals.
    pub stolen_items: u64,
    /// Items whose handler returned an error.
    pub failed: u64,
    /// Items whose handler panicked.
    pub panicked: u64,
    /// Items abandoned at their timeout.
    pub timed_out: u64,
    /// Consecutive empty rotations.
    pub idle_rotations: u64,
    /// Executing an item right now.
    pub busy: bool,
    /// Items resident in the local deque.
    pub deque_len: usize,
}

/// Point-in-time view of the whole pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Workers in the roster.
    pub workers: usize,
    /// Workers executing an item right now.
    pub active_workers: usize,
    /// Per-worker counters, roster order.
    pub per_worker: Vec<WorkerMetrics>,
    /// Items accepted by `submit`.
    pub submitted: u64,
    /// Items refused with `Saturated`.
    pub rejected: u64,
    /// Items executed by workers that have since been retired.
    pub retired_processed: u64,
    /// Items waiting in the overflow queue.
    pub overflow_len: usize,
}

impl PoolMetrics {
    /// Items executed by live and retired workers.
    pub fn processed(&self) -> u64 {
        self.per_worker.iter().map(|w| w.processed).sum::<u64>() + self.retired_processed
    }

    /// Steal operations across live workers.
    pub fn steals(&self) -> u64 {
        self.per_worker.iter().map(|w| w.steals).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_streak_resets_on_work() {
        let s = WorkerStats::default();
        s.mark_idle();
        s.mark_idle();
        assert_eq!(s.idle_streak(), 2);
        s.mark_found_work();
        assert_eq!(s.snapshot(0, 0).idle_rotations, 0);
    }

    #[test]
    fn totals_include_retired_workers() {
        let s = WorkerStats::default();
        s.processed.add(5);
        s.steals.incr();
        let m = PoolMetrics {
            workers: 1,
            active_workers: 0,
            per_worker: vec![s.snapshot(7, 0)],
            submitted: 9,
            rejected: 0,
            retired_processed: 4,
            overflow_len: 0,
        };
        assert_eq!(m.processed(), 9);
        assert_eq!(m.steals(), 1);
    }
}
