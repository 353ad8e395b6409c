//! # Pool worker loop.
//!
//! ```text
//! loop:
//!   inline spill ─► own deque (back, LIFO) ─► overflow (front, FIFO) ─► steal
//!                                                  │ found: steal ahead into own deque
//!        │ found: reset idle streak, execute, repeat
//!        └ none:  shutdown/retire? exit : idle streak += 1, sleep(idle_timeout)
//!                 (woken early by submit, shutdown or retire)
//! ```
//!
//! ## Stealing
//! - Victims are visited in rotation starting at the worker after this one.
//! - A victim whose deque is locked by another thief is skipped for this rotation.
//! - A victim holding fewer than `steal_threshold` items is skipped.
//! - Up to `min(steal_batch_size, ceil(len / 2))` of the victim's oldest items are taken.
//! - The first stolen item runs now; the rest move to this worker's deque,
//!   then the overflow queue, then an inline spill list.
//! - A worker living off the overflow queue also steals ahead: the batch
//!   goes to its own deque and the overflow item runs first.
//!
//! ## Execution
//! The handler runs as its own task. The worker waits for it or for the
//! item context to fire, whichever comes first. A handler outliving its
//! deadline is left running; its late result is discarded.
//!
//! ## Rules
//! - Handler errors, panics and timeouts stay inside [`Worker::execute`].
//! - A retiring worker only drains its own deque, then exits.
//! - On shutdown a worker drains everything it can reach, then exits.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::FutureExt;
use tokio::time;

use super::core::{Shared, WorkerSlot};
use super::item::Runnable;
use crate::context::Context;
use crate::error::{ContextError, TaskError};

pub(crate) struct Worker {
    shared: Arc<Shared>,
    slot: Arc<WorkerSlot>,
    inline: Vec<Runnable>,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>, slot: Arc<WorkerSlot>) -> Self {
        Self {
            shared,
            slot,
            inline: Vec::new(),
        }
    }

    /// Runs the loop until shutdown or retirement.
    ///
    /// A panic escaping the loop itself (not a handler) halts the pool.
    pub(crate) async fn run(mut self) {
        let id = self.slot.id;
        tracing::debug!(worker = id, "worker started");

        if let Err(payload) = AssertUnwindSafe(self.work_loop()).catch_unwind().await {
            let info = TaskError::from_panic(payload);
            self.shared.halt(format!("worker {id} loop crashed: {info}"));
        }

        if self.slot.retire.is_cancelled() {
            self.shared
                .retired_processed
                .add(self.slot.stats.processed.get());
            tracing::info!(worker = id, "worker retired");
        } else {
            tracing::debug!(worker = id, "worker stopped");
        }
    }

    async fn work_loop(&mut self) {
        let idle = self.shared.cfg.idle_timeout();
        loop {
            let retiring = self.slot.retire.is_cancelled();

            let mut next = self.inline.pop().or_else(|| self.slot.deque.lock().pop_back());
            if next.is_none() && !retiring {
                next = self.shared.pop_overflow();
                if next.is_some() {
                    self.steal_ahead();
                }
            }
            if next.is_none() && !retiring {
                next = self.steal();
            }

            if let Some(item) = next {
                self.slot.stats.mark_found_work();
                Self::execute(&self.slot, item).await;
                continue;
            }

            if retiring || self.shared.shutdown.is_cancelled() {
                return;
            }

            self.slot.stats.mark_idle();
            tokio::select! {
                _ = time::sleep(idle) => {}
                _ = self.slot.wake.notified() => {}
                _ = self.shared.wake.notified() => {}
                _ = self.shared.shutdown.cancelled() => {}
                _ = self.slot.retire.cancelled() => {}
            }
        }
    }

    /// Called with an overflow item in hand and nothing local: a victim deque at
    /// or above `steal_threshold` is split now rather than left to its owner.
    fn steal_ahead(&mut self) {
        if let Some(item) = self.steal() {
            if let Err(item) = self.slot.deque.lock().push_back(item) {
                self.inline.push(item);
            }
        }
    }

    /// Takes a batch from the first eligible victim and returns one item to run.
    fn steal(&mut self) -> Option<Runnable> {
        let roster = self.shared.roster.read().clone();
        let n = roster.len();
        let start = roster
            .iter()
            .position(|s| s.id == self.slot.id)
            .map_or(0, |i| i + 1);
        let threshold = self.shared.cfg.steal_threshold.max(1);
        let batch_max = self.shared.cfg.steal_batch_size.max(1);

        let mut batch = self.shared.buffers.get();
        batch.clear();

        for k in 0..n {
            let victim = &roster[(start + k) % n];
            if victim.id == self.slot.id {
                continue;
            }
            // Another thief or the owner holds it; move on.
            let Some(mut dq) = victim.deque.try_lock() else {
                continue;
            };
            let len = dq.len();
            if len < threshold {
                continue;
            }
            let take = batch_max.min(len.div_ceil(2));
            dq.steal_front(take, &mut batch);
            drop(dq);

            if batch.is_empty() {
                continue;
            }
            self.slot.stats.steals.incr();
            self.slot.stats.stolen_items.add(batch.len() as u64);
            tracing::trace!(
                worker = self.slot.id,
                victim = victim.id,
                items = batch.len(),
                "stole work"
            );
            break;
        }

        let mut stolen = batch.drain(..);
        let first = stolen.next();
        if first.is_some() {
            let mut own = self.slot.deque.lock();
            for item in stolen {
                if let Err(item) = own.push_back(item) {
                    if let Err(item) = self.shared.overflow.lock().push_back(item) {
                        self.inline.push(item);
                    }
                }
            }
        } else {
            drop(stolen);
        }
        self.shared.buffers.put(batch);
        first
    }

    /// Runs one item, isolating its failure.
    ///
    /// Takes the slot rather than `&self`: the spill list is not `Sync`.
    async fn execute(slot: &WorkerSlot, item: Runnable) {
        let Runnable {
            id: item_id,
            timeout,
            ctx,
            run,
            done,
            ..
        } = item;
        let stats = &slot.stats;

        let parent = ctx.unwrap_or_else(Context::background);
        let (ctx, release) = match timeout {
            Some(d) => parent.with_timeout(d),
            None => parent.with_cancel(),
        };

        stats.busy.store(true, Ordering::Relaxed);
        let expired = ctx.err();
        let mut handle = tokio::spawn(run(ctx.clone()));
        let res = match expired {
            // Fired before the start: the handler only gets to see a cancelled context.
            Some(err) => Err(err.into()),
            None => tokio::select! {
                biased;
                joined = &mut handle => match joined {
                    Ok(out) => out,
                    Err(e) if e.is_panic() => Err(TaskError::from_panic(e.into_panic())),
                    Err(_) => Err(TaskError::Cancelled),
                },
                _ = ctx.cancelled() => Err(ctx.err().unwrap_or(ContextError::Cancelled).into()),
            },
        };
        release.release();
        stats.busy.store(false, Ordering::Relaxed);
        stats.processed.incr();

        match &res {
            Ok(()) => {}
            Err(TaskError::Panicked { info }) => {
                stats.panicked.incr();
                tracing::error!(worker = slot.id, item = %item_id, %info, "work item panicked");
            }
            Err(TaskError::DeadlineExceeded) => {
                stats.timed_out.incr();
                tracing::warn!(worker = slot.id, item = %item_id, ?timeout, "work item abandoned at deadline; handler left running");
            }
            Err(e) => {
                stats.failed.incr();
                tracing::warn!(worker = slot.id, item = %item_id, error = %e, "work item failed");
            }
        }
        Runnable::complete(done, res);
    }
}
