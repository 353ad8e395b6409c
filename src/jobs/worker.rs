//! # Queue consumer.
//!
//! [`JobWorker`] runs one pump task that feeds jobs from a [`Queue`] into the
//! [`TaskPool`]. At most `workers` jobs are in flight at once.
//!
//! ```text
//! pump: acquire slot ─► bpop(root) ─► pool.submit(WorkItem(job))
//!                                          │
//! work item:                               ▼
//!   attempt = run_job(ctx, job, timeout)
//!     ├─ Ok                                   → done
//!     ├─ Err retryable && attempts + 1 < max  → wait retry delay → queue.retry
//!     └─ Err otherwise                        → queue.fail
//!   release slot
//! ```
//!
//! ## Rules
//! - A job popped from the queue is never dropped. If the pool refuses it,
//!   the pump runs it itself.
//! - Stopping interrupts retry waits, but the job is still re-queued.
//! - `stop` returns after the pump exits and every in-flight job settled.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::config::QueueConfig;
use super::dispatcher::run_job;
use super::job::{Job, QueuedJob};
use super::queue::Queue;
use crate::context::{Context, ContextManager};
use crate::error::{QueueError, TaskError};
use crate::pool::{TaskPool, WorkItem};
use crate::primitives::AtomicCounter;

/// Counters exposed by [`JobWorker::metrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobMetrics {
    /// Attempts started.
    pub processed: u64,
    pub succeeded: u64,
    /// Attempts that were re-queued.
    pub retried: u64,
    /// Jobs moved to the failed set.
    pub failed: u64,
    /// Jobs currently held by the worker.
    pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
    processed: AtomicCounter,
    succeeded: AtomicCounter,
    retried: AtomicCounter,
    failed: AtomicCounter,
    in_flight: AtomicUsize,
}

struct Inner<J> {
    cfg: QueueConfig,
    queue: Arc<dyn Queue<J>>,
    pool: TaskPool,
    contexts: ContextManager,
    slots: Arc<Semaphore>,
    stop: CancellationToken,
    counters: Counters,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Background consumer of a job queue.
pub struct JobWorker<J> {
    inner: Arc<Inner<J>>,
}

impl<J> Clone for JobWorker<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<J: Job> JobWorker<J> {
    pub fn new(cfg: QueueConfig, queue: Arc<dyn Queue<J>>, pool: TaskPool, contexts: ContextManager) -> Self {
        let slots = Arc::new(Semaphore::new(cfg.workers.max(1)));
        Self {
            inner: Arc::new(Inner {
                cfg,
                queue,
                pool,
                contexts,
                slots,
                stop: CancellationToken::new(),
                counters: Counters::default(),
                pump: Mutex::new(None),
            }),
        }
    }

    /// Starts the pump. Calling it again while running, or after stop, does nothing.
    pub fn start(&self) {
        let mut pump = self.inner.pump.lock();
        if pump.is_some() || self.inner.stop.is_cancelled() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *pump = Some(tokio::spawn(inner.pump()));
        tracing::info!(workers = self.inner.cfg.workers, "job worker started");
    }

    /// Stops consuming and waits for in-flight jobs to settle.
    pub async fn stop(&self) {
        self.inner.stop.cancel();
        let pump = self.inner.pump.lock().take();
        if let Some(handle) = pump {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "job pump ended abnormally");
            }
        }

        let all = u32::try_from(self.inner.cfg.workers.max(1)).unwrap_or(u32::MAX);
        if self.inner.slots.acquire_many(all).await.is_err() {
            tracing::warn!("job slots closed before in-flight jobs settled");
        }
        tracing::info!("job worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.pump.lock().is_some() && !self.inner.stop.is_cancelled()
    }

    pub fn metrics(&self) -> JobMetrics {
        let c = &self.inner.counters;
        JobMetrics {
            processed: c.processed.get(),
            succeeded: c.succeeded.get(),
            retried: c.retried.get(),
            failed: c.failed.get(),
            in_flight: c.in_flight.load(Ordering::Relaxed),
        }
    }
}

impl<J: Job> Inner<J> {
    async fn pump(self: Arc<Self>) {
        let (root, _release) = Context::background().with_cancel();
        let mut seq = 0usize;

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                p = Arc::clone(&self.slots).acquire_owned() => match p {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                res = self.queue.bpop(&root) => match res {
                    Ok(job) => job,
                    Err(QueueError::Closed) | Err(QueueError::Context(_)) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "queue pop failed");
                        drop(permit);
                        time::sleep(self.pool.config().idle_timeout()).await;
                        continue;
                    }
                },
            };

            self.counters.in_flight.fetch_add(1, Ordering::Relaxed);
            seq = seq.wrapping_add(1);
            let id = job.id.clone();
            let inner = Arc::clone(&self);
            let item = WorkItem::new(seq, job, move |ctx, job| async move {
                inner.process(&ctx, job, permit).await;
                Ok::<(), TaskError>(())
            })
            .with_id(id.clone());

            if let Some(err) = self.pool.submit_or_run_inline(item).await {
                tracing::warn!(job = %id, error = %err, "pool refused job; ran it on the pump");
            }
        }
        tracing::debug!("job pump stopped");
    }

    /// Runs one attempt and settles the job.
    async fn process(&self, ctx: &Context, mut job: QueuedJob<J>, permit: OwnedSemaphorePermit) {
        self.counters.processed.incr();
        job.processed_at = Some(Utc::now());

        let attempt = job.attempts + 1;
        let res = run_job(&self.contexts, ctx, Arc::clone(&job.payload), job.timeout()).await;

        match res {
            Ok(()) => {
                self.counters.succeeded.incr();
                tracing::debug!(job = %job.id, name = %job.name, attempt, "job succeeded");
            }
            Err(e) if e.is_retryable() && job.can_retry() => {
                self.counters.retried.incr();
                let delay = self.cfg.retry_policy_for(&job.name).delay(job.attempts);
                tracing::warn!(
                    job = %job.id,
                    name = %job.name,
                    attempt,
                    max = job.max_retries,
                    ?delay,
                    error = %e,
                    "job attempt failed; retrying"
                );
                if let Some(d) = delay {
                    tokio::select! {
                        _ = time::sleep(d) => {}
                        _ = self.stop.cancelled() => {}
                    }
                }
                let id = job.id.clone();
                if let Err(qe) = self.queue.retry(job).await {
                    tracing::error!(job = %id, error = %qe, "job lost: re-queue failed");
                }
            }
            Err(e) => {
                self.counters.failed.incr();
                tracing::error!(
                    job = %job.id,
                    name = %job.name,
                    attempt,
                    error = %e,
                    "job failed permanently"
                );
                let id = job.id.clone();
                if let Err(qe) = self.queue.fail(job, e.to_string()).await {
                    tracing::error!(job = %id, error = %qe, "recording failed job failed");
                }
            }
        }
        self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
        drop(permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobOverride, MemoryQueue, RetryMode};
    use crate::pool::PoolConfig;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Flaky {
        fail_first: usize,
        fatal: bool,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn handle(&self, _ctx: Context) -> Result<(), TaskError> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fatal {
                return Err(TaskError::fatal("bad input"));
            }
            if n < self.fail_first {
                return Err(TaskError::fail(format!("attempt {n} failed")));
            }
            Ok(())
        }
    }

    fn pool() -> TaskPool {
        TaskPool::new(PoolConfig {
            num_workers: 2,
            idle_timeout_ms: 5,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    fn cfg() -> QueueConfig {
        QueueConfig {
            workers: 2,
            retry_policy: RetryMode::Immediate,
            ..QueueConfig::default()
        }
    }

    /// Waits until one job reached a final outcome.
    async fn settle(worker: &JobWorker<Flaky>) {
        for _ in 0..200 {
            let m = worker.metrics();
            if m.succeeded + m.failed == 1 && m.in_flight == 0 {
                return;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        panic!("worker did not settle: {:?}", worker.metrics());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn retries_until_success() {
        let queue = Arc::new(MemoryQueue::<Flaky>::new(0, 10));
        let pool = pool();
        let worker = JobWorker::new(cfg(), queue.clone(), pool.clone(), ContextManager::default());
        worker.start();

        let runs = Arc::new(AtomicUsize::new(0));
        let job = Flaky {
            fail_first: 2,
            fatal: false,
            runs: runs.clone(),
        };
        queue.push(QueuedJob::new(job, 3, None)).await.unwrap();

        settle(&worker).await;
        worker.stop().await;
        pool.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let m = worker.metrics();
        assert_eq!((m.succeeded, m.retried, m.failed), (1, 2, 0));
        assert_eq!(queue.failed_size().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fatal_errors_skip_retries() {
        let queue = Arc::new(MemoryQueue::<Flaky>::new(0, 10));
        let pool = pool();
        let worker = JobWorker::new(cfg(), queue.clone(), pool.clone(), ContextManager::default());
        worker.start();

        let runs = Arc::new(AtomicUsize::new(0));
        let job = Flaky {
            fail_first: 0,
            fatal: true,
            runs: runs.clone(),
        };
        queue.push(QueuedJob::new(job, 5, None)).await.unwrap();

        settle(&worker).await;
        worker.stop().await;
        pool.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let failed = queue.failed().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error, TaskError::fatal("bad input").to_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_deadline_fails_before_the_handler_runs() {
        let queue = Arc::new(MemoryQueue::<Flaky>::new(0, 10));
        let pool = pool();
        let worker = JobWorker::new(cfg(), queue.clone(), pool.clone(), ContextManager::default());
        worker.start();

        let runs = Arc::new(AtomicUsize::new(0));
        let job = Flaky {
            fail_first: 0,
            fatal: false,
            runs: runs.clone(),
        };
        queue
            .push(QueuedJob::new(job, 1, Some(Duration::ZERO)))
            .await
            .unwrap();

        settle(&worker).await;
        worker.stop().await;
        pool.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let failed = queue.failed().await.unwrap();
        assert_eq!(failed[0].error, TaskError::DeadlineExceeded.to_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_cuts_retry_wait_but_requeues() {
        let queue = Arc::new(MemoryQueue::<Flaky>::new(0, 10));
        let pool = pool();
        let mut cfg = cfg();
        cfg.retry_policy = RetryMode::Backoff;
        cfg.jobs.insert(
            "flaky".into(),
            JobOverride {
                retry_delay_ms: Some(60_000),
                ..JobOverride::default()
            },
        );
        let worker = JobWorker::new(cfg, queue.clone(), pool.clone(), ContextManager::default());
        worker.start();

        let runs = Arc::new(AtomicUsize::new(0));
        let job = Flaky {
            fail_first: 10,
            fatal: false,
            runs: runs.clone(),
        };
        queue.push(QueuedJob::new(job, 3, None)).await.unwrap();

        for _ in 0..200 {
            if worker.metrics().retried == 1 {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        time::timeout(Duration::from_secs(2), worker.stop())
            .await
            .expect("stop must not wait out the retry delay");
        pool.shutdown().await;

        let requeued = queue.pop().await.unwrap().expect("job re-queued");
        assert_eq!(requeued.attempts, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
