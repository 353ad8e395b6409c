//! # Task pool: admission, roster and shutdown.
//!
//! [`TaskPool`] owns the worker roster, the overflow queue and the shutdown
//! token. Workers ([`Worker`]) and the optional [`Scaler`] run as tokio tasks
//! sharing one [`Shared`] block.
//!
//! ## Architecture
//! ```text
//! submit(item) ──► roster[priority % N].deque ──full──► overflow ──full──► Saturated
//!                        │                                 │
//!                        ▼                                 ▼
//!                 Worker N (own, LIFO) ◄── steal ── Worker M ◄── FIFO
//!
//! close()    → accepting = false (under roster write lock), cancel shutdown token
//! shutdown() → close + await every worker (each drains what it can reach)
//! ```
//!
//! ## Rules
//! - Admission and roster changes are serialized by the roster lock, so no
//!   item is pushed into a deque whose worker already left.
//! - An item is resident in exactly one deque, the overflow queue, or a
//!   worker's hands.
//! - A halted pool refuses all work with [`PoolError::Fatal`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::PoolConfig;
use super::item::{Completion, Runnable, WorkItem};
use super::metrics::{PoolMetrics, WorkerStats};
use super::scaler::Scaler;
use super::worker::Worker;
use crate::error::{ConfigError, PoolError, RuntimeError, TaskError};
use crate::primitives::{AtomicCounter, BoundedDeque, ObjectPool};

/// One roster entry.
pub(crate) struct WorkerSlot {
    pub id: usize,
    pub deque: Mutex<BoundedDeque<Runnable>>,
    pub stats: WorkerStats,
    pub wake: Notify,
    pub retire: CancellationToken,
}

/// State shared by the pool handle, its workers and its scaler.
pub(crate) struct Shared {
    pub cfg: PoolConfig,
    pub roster: RwLock<Vec<Arc<WorkerSlot>>>,
    pub overflow: Mutex<BoundedDeque<Runnable>>,
    pub accepting: AtomicBool,
    pub halted: OnceLock<String>,
    pub shutdown: CancellationToken,
    pub wake: Notify,
    pub buffers: ObjectPool<Vec<Runnable>>,
    pub submitted: AtomicCounter,
    pub rejected: AtomicCounter,
    pub retired_processed: AtomicCounter,
    next_worker_id: AtomicUsize,
    handles: Mutex<Vec<(usize, JoinHandle<()>)>>,
}

impl Shared {
    fn new(cfg: PoolConfig) -> Self {
        let buffers = cfg.workers().max(cfg.max());
        Self {
            overflow: Mutex::new(BoundedDeque::new(cfg.queue_size)),
            roster: RwLock::new(Vec::new()),
            accepting: AtomicBool::new(true),
            halted: OnceLock::new(),
            shutdown: CancellationToken::new(),
            wake: Notify::new(),
            buffers: ObjectPool::new(buffers, Vec::new),
            submitted: AtomicCounter::new(),
            rejected: AtomicCounter::new(),
            retired_processed: AtomicCounter::new(),
            next_worker_id: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
            cfg,
        }
    }

    /// Adds a worker to the roster and starts its loop.
    ///
    /// Returns `None` once the pool stopped accepting.
    pub(crate) fn spawn_worker(self: &Arc<Self>) -> Option<usize> {
        let mut roster = self.roster.write();
        if !self.accepting.load(Ordering::Acquire) {
            return None;
        }
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(WorkerSlot {
            id,
            deque: Mutex::new(BoundedDeque::new(self.cfg.deque_capacity)),
            stats: WorkerStats::default(),
            wake: Notify::new(),
            retire: CancellationToken::new(),
        });
        roster.push(Arc::clone(&slot));

        let handle = tokio::spawn(Worker::new(Arc::clone(self), slot).run());
        let mut handles = self.handles.lock();
        handles.retain(|(_, h)| !h.is_finished());
        handles.push((id, handle));
        Some(id)
    }

    /// Removes the newest worker from the roster (never below `floor`) and
    /// tells it to drain and exit.
    pub(crate) fn retire_worker(&self, floor: usize) -> Option<usize> {
        let victim = {
            let mut roster = self.roster.write();
            if roster.len() <= floor.max(1) {
                return None;
            }
            roster.pop()
        }?;
        victim.retire.cancel();
        Some(victim.id)
    }

    /// Pops the oldest overflow item and wakes another worker if more remain.
    pub(crate) fn pop_overflow(&self) -> Option<Runnable> {
        let (item, remaining) = {
            let mut q = self.overflow.lock();
            let item = q.pop_front();
            (item, q.len())
        };
        if item.is_some() && remaining > 0 {
            self.wake.notify_one();
        }
        item
    }

    pub(crate) fn overflow_len(&self) -> usize {
        self.overflow.lock().len()
    }

    /// Stops acceptance for good after a structural failure.
    pub(crate) fn halt(&self, reason: String) {
        tracing::error!(%reason, "task pool halted");
        let _ = self.halted.set(reason);
        self.accepting.store(false, Ordering::Release);
    }

    /// Admits `item`, handing it back with the reason on refusal.
    pub(crate) fn enqueue(&self, item: Runnable) -> Result<(), (PoolError, Runnable)> {
        if let Some(reason) = self.halted.get() {
            let err = PoolError::Fatal {
                reason: reason.clone(),
            };
            return Err((err, item));
        }

        let roster = self.roster.read();
        if !self.accepting.load(Ordering::Acquire) {
            return Err((PoolError::Closed, item));
        }

        let item = match roster.get(item.priority % roster.len().max(1)) {
            Some(slot) => {
                let pushed = {
                    let mut dq = slot.deque.lock();
                    dq.push_back(item).map(|()| dq.len())
                };
                match pushed {
                    Ok(len) => {
                        self.submitted.incr();
                        slot.wake.notify_one();
                        // Enough queued locally to be worth stealing.
                        if len >= self.cfg.steal_threshold.max(1) {
                            self.wake.notify_one();
                        }
                        return Ok(());
                    }
                    Err(item) => item,
                }
            }
            None => item,
        };

        let pushed = self.overflow.lock().push_back(item);
        match pushed {
            Ok(()) => {
                self.submitted.incr();
                self.wake.notify_one();
                Ok(())
            }
            Err(item) => {
                self.rejected.incr();
                tracing::debug!(item = %item.id, capacity = self.cfg.queue_size, "pool saturated");
                let err = PoolError::Saturated {
                    capacity: self.cfg.queue_size,
                };
                Err((err, item))
            }
        }
    }

    fn take_handles(&self) -> Vec<(usize, JoinHandle<()>)> {
        std::mem::take(&mut *self.handles.lock())
    }
}

/// Work-stealing pool of async workers.
///
/// Cloning yields another handle to the same pool.
///
/// # Example
/// ```
/// use worklane::{PoolConfig, TaskError, TaskPool, WorkItem};
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = TaskPool::new(PoolConfig { num_workers: 2, ..PoolConfig::default() }).unwrap();
/// let done = pool
///     .submit_with_completion(WorkItem::new(0, 2u8, |_ctx, n| async move {
///         if n == 2 { Ok(()) } else { Err(TaskError::fail("odd")) }
///     }))
///     .unwrap();
/// assert_eq!(done.await, Ok(()));
/// pool.shutdown().await;
/// # }
/// ```
#[derive(Clone)]
pub struct TaskPool {
    shared: Arc<Shared>,
    scaler: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TaskPool {
    /// Validates `cfg` and starts the workers (and the scaler when enabled).
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn new(cfg: PoolConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let workers = cfg.workers();
        let scaling = cfg.enable_auto_scaling;
        let shared = Arc::new(Shared::new(cfg));

        for _ in 0..workers {
            shared.spawn_worker();
        }
        let scaler = scaling.then(|| tokio::spawn(Scaler::new(Arc::clone(&shared)).run()));

        tracing::info!(workers, auto_scaling = scaling, "task pool started");
        Ok(Self {
            shared,
            scaler: Arc::new(Mutex::new(scaler)),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.cfg
    }

    /// Queues `item` on worker `priority mod N`, falling back to the overflow queue.
    ///
    /// Never blocks. Fails with [`PoolError::Saturated`] when both are full.
    pub fn submit<T: Send + 'static>(&self, item: WorkItem<T>) -> Result<(), PoolError> {
        self.shared
            .enqueue(item.into_runnable(None))
            .map_err(|(err, _)| err)
    }

    /// Like [`TaskPool::submit`], but a refused item is run on the calling
    /// task instead of being dropped. Returns the refusal reason, if any.
    pub(crate) async fn submit_or_run_inline<T: Send + 'static>(&self, item: WorkItem<T>) -> Option<PoolError> {
        let (err, item) = self.shared.enqueue(item.into_runnable(None)).err()?;
        let parent = item.ctx.clone().unwrap_or_default();
        let (ctx, _release) = match item.timeout {
            Some(d) => parent.with_timeout(d),
            None => parent.with_cancel(),
        };
        let res = AssertUnwindSafe((item.run)(ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|p| Err(TaskError::from_panic(p)));
        Runnable::complete(item.done, res);
        Some(err)
    }

    /// Lazy variant of [`TaskPool::submit`]: submission happens on first poll.
    pub fn submit_async<T: Send + 'static>(
        &self,
        item: WorkItem<T>,
    ) -> impl Future<Output = Result<(), PoolError>> + Send + 'static {
        let pool = self.clone();
        async move { pool.submit(item) }
    }

    /// Queues `item` and returns a [`Completion`] resolving with its handler result.
    pub fn submit_with_completion<T: Send + 'static>(
        &self,
        item: WorkItem<T>,
    ) -> Result<Completion, PoolError> {
        let (tx, completion) = Completion::channel();
        self.shared
            .enqueue(item.into_runnable(Some(tx)))
            .map_err(|(err, _)| err)?;
        Ok(completion)
    }

    /// True while new work is admitted.
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Workers currently in the roster.
    pub fn worker_count(&self) -> usize {
        self.shared.roster.read().len()
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> PoolMetrics {
        let per_worker: Vec<_> = {
            let roster = self.shared.roster.read();
            roster
                .iter()
                .map(|s| s.stats.snapshot(s.id, s.deque.lock().len()))
                .collect()
        };
        PoolMetrics {
            workers: per_worker.len(),
            active_workers: per_worker.iter().filter(|w| w.busy).count(),
            per_worker,
            submitted: self.shared.submitted.get(),
            rejected: self.shared.rejected.get(),
            retired_processed: self.shared.retired_processed.get(),
            overflow_len: self.shared.overflow_len(),
        }
    }

    /// Stops admission and tells workers to drain. Idempotent; does not wait.
    pub fn close(&self) {
        let was_accepting = {
            let _roster = self.shared.roster.write();
            self.shared.accepting.swap(false, Ordering::AcqRel)
        };
        self.shared.shutdown.cancel();
        if was_accepting {
            tracing::info!("task pool closing");
        }
    }

    /// Closes the pool and waits until every worker drained and exited.
    pub async fn shutdown(&self) {
        self.close();
        self.join_scaler().await;
        for (id, handle) in self.shared.take_handles() {
            if let Err(e) = handle.await {
                tracing::error!(worker = id, error = %e, "worker task ended abnormally");
            }
        }
        tracing::info!("task pool stopped");
    }

    /// As [`TaskPool::shutdown`], but gives up after `grace`.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] with the ids of workers still
    /// running; they keep draining in the background.
    pub async fn shutdown_with_grace(&self, grace: Duration) -> Result<(), RuntimeError> {
        self.close();
        self.join_scaler().await;

        let mut handles = self.shared.take_handles();
        let all_done = async {
            for (_, handle) in handles.iter_mut() {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(grace, all_done).await.is_ok() {
            tracing::info!("task pool stopped within grace");
            return Ok(());
        }

        let stuck: Vec<usize> = handles
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(id, _)| *id)
            .collect();
        tracing::warn!(?grace, ?stuck, "task pool grace exceeded");
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }

    async fn join_scaler(&self) {
        let scaler = self.scaler.lock().take();
        if let Some(handle) = scaler {
            let _ = handle.await;
        }
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.worker_count())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::oneshot;

    fn pool(workers: usize, deque: usize, overflow: usize) -> TaskPool {
        TaskPool::new(PoolConfig {
            num_workers: workers,
            deque_capacity: deque,
            queue_size: overflow,
            idle_timeout_ms: 10,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_item_runs_once() {
        let p = pool(3, 4, 64);
        let hits = Arc::new(AtomicU32::new(0));
        for i in 0..40 {
            let hits = hits.clone();
            p.submit(WorkItem::new(i, (), move |_ctx, _| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        }
        p.shutdown().await;
        assert_eq!(hits.load(Ordering::SeqCst), 40);
        let m = p.metrics();
        assert_eq!(m.processed(), 40);
        assert_eq!(m.submitted, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn saturation_is_reported_immediately() {
        let p = pool(1, 1, 1);
        let (started_tx, started_rx) = oneshot::channel();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        p.submit(WorkItem::new(0, (), move |_ctx, _| async move {
            let _ = started_tx.send(());
            let _ = gate_rx.await;
            Ok(())
        }))
        .unwrap();
        started_rx.await.unwrap();

        let noop = || WorkItem::new(0, (), |_ctx, _| async { Ok(()) });
        p.submit(noop()).unwrap(); // local deque
        p.submit(noop()).unwrap(); // overflow
        assert_eq!(p.submit(noop()), Err(PoolError::Saturated { capacity: 1 }));
        assert_eq!(p.metrics().rejected, 1);

        gate_tx.send(()).unwrap();
        p.shutdown().await;
        assert_eq!(p.metrics().processed(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_and_panics_stay_inside_the_worker() {
        let p = pool(1, 8, 8);
        let failed = p
            .submit_with_completion(WorkItem::new(0, (), |_ctx, _| async {
                Err(TaskError::fail("boom"))
            }))
            .unwrap();
        let panicked = p
            .submit_with_completion(WorkItem::new(0, (), |_ctx, _| async {
                if true {
                    panic!("kaboom");
                }
                Ok(())
            }))
            .unwrap();
        let fine = p
            .submit_with_completion(WorkItem::new(0, (), |_ctx, _| async { Ok(()) }))
            .unwrap();

        assert_eq!(failed.await, Err(TaskError::fail("boom")));
        assert!(matches!(panicked.await, Err(TaskError::Panicked { .. })));
        assert_eq!(fine.await, Ok(()));

        let w = &p.metrics().per_worker[0];
        assert_eq!((w.processed, w.failed, w.panicked), (3, 1, 1));
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timed_out_items_are_abandoned() {
        let p = pool(1, 8, 8);
        let done = p
            .submit_with_completion(
                WorkItem::new(0, (), |_ctx, _| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .with_timeout(Duration::from_millis(20)),
            )
            .unwrap();
        assert_eq!(done.await, Err(TaskError::DeadlineExceeded));
        assert_eq!(p.metrics().per_worker[0].timed_out, 1);
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_handler_runs_to_completion() {
        let p = pool(1, 8, 8);
        let (finished_tx, finished_rx) = oneshot::channel();
        let done = p
            .submit_with_completion(
                WorkItem::new(0, (), move |_ctx, _| async move {
                    // Never samples its context.
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    let _ = finished_tx.send(());
                    Ok(())
                })
                .with_timeout(Duration::from_millis(20)),
            )
            .unwrap();
        assert_eq!(done.await, Err(TaskError::DeadlineExceeded));

        tokio::time::timeout(Duration::from_secs(2), finished_rx)
            .await
            .expect("handler kept running past its deadline")
            .unwrap();
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_timeout_handler_sees_cancelled_context() {
        let p = pool(1, 8, 8);
        let (seen_tx, seen_rx) = oneshot::channel();
        let done = p
            .submit_with_completion(
                WorkItem::new(0, (), move |ctx: crate::context::Context, _| async move {
                    let _ = seen_tx.send(ctx.is_cancelled());
                    Ok(())
                })
                .with_timeout(Duration::ZERO),
            )
            .unwrap();
        assert_eq!(done.await, Err(TaskError::DeadlineExceeded));
        assert!(seen_rx.await.unwrap());
        p.shutdown().await;
    }

    #[tokio::test]
    async fn closed_pool_refuses_work() {
        let p = pool(1, 4, 4);
        p.close();
        let res = p.submit_async(WorkItem::new(0, (), |_ctx, _| async { Ok(()) })).await;
        assert_eq!(res, Err(PoolError::Closed));
        p.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn grace_overrun_names_stuck_workers() {
        let p = pool(1, 4, 4);
        let (started_tx, started_rx) = oneshot::channel();
        p.submit(WorkItem::new(0, (), move |_ctx, _| async move {
            let _ = started_tx.send(());
            // Ignores its context on purpose.
            std::future::pending::<()>().await;
            Ok(())
        }))
        .unwrap();
        started_rx.await.unwrap();

        let err = p.shutdown_with_grace(Duration::from_millis(30)).await.unwrap_err();
        match err {
            RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, vec![0]),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn halted_pool_reports_fatal() {
        let p = pool(1, 4, 4);
        p.shared.halt("deque corrupted".into());
        let err = p
            .submit(WorkItem::new(0, (), |_ctx, _| async { Ok(()) }))
            .unwrap_err();
        assert_eq!(err.as_label(), "pool_fatal");
        p.shutdown().await;
    }
}
