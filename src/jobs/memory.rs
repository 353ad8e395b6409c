//! # In-process queue driver.
//!
//! ```text
//! push ──► pending (VecDeque, FIFO, bounded?) ──► pop / bpop
//!              ▲                                     │
//!              └────────── retry (attempts + 1) ◄────┤ error, budget left
//!                                                    ▼
//!                              failed (VecDeque, bounded, oldest evicted)
//! ```
//!
//! Blocked `bpop` callers are woken through a [`Notify`] on every push.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::job::{FailedJob, QueuedJob};
use super::queue::Queue;
use crate::context::Context;
use crate::error::{ContextError, QueueError};

/// [`Queue`] held in process memory.
///
/// # Example
/// ```
/// use worklane::jobs::{MemoryQueue, Queue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue: MemoryQueue<()> = MemoryQueue::new(2, 10);
/// assert_eq!(queue.size().await.unwrap(), 0);
/// assert!(queue.pop().await.unwrap().is_none());
/// # }
/// ```
pub struct MemoryQueue<J> {
    pending: Mutex<VecDeque<QueuedJob<J>>>,
    failed: Mutex<VecDeque<FailedJob<J>>>,
    capacity: usize,
    failed_capacity: usize,
    ready: Notify,
    closed: AtomicBool,
}

impl<J> MemoryQueue<J> {
    /// Creates a queue. `0` for either bound means unbounded.
    pub fn new(capacity: usize, failed_capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            failed: Mutex::new(VecDeque::new()),
            capacity,
            failed_capacity,
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Refuses further pushes and wakes blocked consumers.
    ///
    /// Pending jobs stay poppable; `bpop` reports [`QueueError::Closed`] once
    /// they are gone. Retries are still accepted.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn admit(&self, pending: &VecDeque<QueuedJob<J>>, incoming: usize) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        if self.capacity > 0 && pending.len() + incoming > self.capacity {
            return Err(QueueError::QueueFull {
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<J> Queue<J> for MemoryQueue<J>
where
    J: Send + Sync + 'static,
{
    async fn push(&self, job: QueuedJob<J>) -> Result<(), QueueError> {
        {
            let mut pending = self.pending.lock();
            self.admit(&pending, 1)?;
            pending.push_back(job);
        }
        self.ready.notify_waiters();
        Ok(())
    }

    async fn push_many(&self, jobs: Vec<QueuedJob<J>>) -> Result<(), QueueError> {
        if jobs.is_empty() {
            return Ok(());
        }
        {
            let mut pending = self.pending.lock();
            self.admit(&pending, jobs.len())?;
            pending.extend(jobs);
        }
        self.ready.notify_waiters();
        Ok(())
    }

    async fn pop(&self) -> Result<Option<QueuedJob<J>>, QueueError> {
        Ok(self.pending.lock().pop_front())
    }

    async fn bpop(&self, ctx: &Context) -> Result<QueuedJob<J>, QueueError> {
        loop {
            ctx.check()?;
            let mut notified = pin!(self.ready.notified());
            // Register before looking so a push in between is not missed.
            notified.as_mut().enable();

            if let Some(job) = self.pending.lock().pop_front() {
                return Ok(job);
            }
            if self.is_closed() {
                return Err(QueueError::Closed);
            }

            tokio::select! {
                _ = notified => {}
                _ = ctx.cancelled() => {
                    return Err(ctx.err().unwrap_or(ContextError::Cancelled).into());
                }
            }
        }
    }

    async fn pop_many(&self, n: usize) -> Result<Vec<QueuedJob<J>>, QueueError> {
        let mut pending = self.pending.lock();
        let take = n.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    async fn retry(&self, mut job: QueuedJob<J>) -> Result<(), QueueError> {
        job.attempts += 1;
        self.pending.lock().push_back(job);
        self.ready.notify_waiters();
        Ok(())
    }

    async fn fail(&self, job: QueuedJob<J>, error: String) -> Result<(), QueueError> {
        let mut failed = self.failed.lock();
        if self.failed_capacity > 0 && failed.len() >= self.failed_capacity {
            if let Some(evicted) = failed.pop_front() {
                tracing::warn!(
                    job = %evicted.job.id,
                    name = %evicted.job.name,
                    capacity = self.failed_capacity,
                    "failed set full; evicted oldest entry"
                );
            }
        }
        failed.push_back(FailedJob {
            job,
            error,
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn size(&self) -> Result<usize, QueueError> {
        Ok(self.pending.lock().len())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.pending.lock().clear();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), QueueError> {
        let mut pending = self.pending.lock();
        let pos = pending
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| QueueError::NotFound { id: id.to_string() })?;
        pending.remove(pos);
        Ok(())
    }

    async fn failed(&self) -> Result<Vec<FailedJob<J>>, QueueError> {
        Ok(self.failed.lock().iter().cloned().collect())
    }

    async fn drain_failed(&self) -> Result<Vec<FailedJob<J>>, QueueError> {
        Ok(self.failed.lock().drain(..).collect())
    }

    async fn failed_size(&self) -> Result<usize, QueueError> {
        Ok(self.failed.lock().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::{Job, ShouldQueue};
    use crate::error::TaskError;
    use std::sync::Arc;
    use std::time::Duration;

    struct Noop(&'static str);

    #[async_trait]
    impl Job for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(&self, _ctx: Context) -> Result<(), TaskError> {
            Ok(())
        }

        fn should_queue(&self) -> Option<ShouldQueue> {
            Some(ShouldQueue::default())
        }
    }

    fn rec(name: &'static str) -> QueuedJob<Noop> {
        QueuedJob::new(Noop(name), 3, None)
    }

    #[tokio::test]
    async fn fifo_order_and_bound() {
        let q = MemoryQueue::new(2, 0);
        q.push(rec("a")).await.unwrap();
        q.push(rec("b")).await.unwrap();
        assert_eq!(
            q.push(rec("c")).await,
            Err(QueueError::QueueFull { capacity: 2 })
        );

        assert_eq!(q.pop().await.unwrap().unwrap().name, "a");
        assert_eq!(q.pop().await.unwrap().unwrap().name, "b");
        assert!(q.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_many_is_all_or_nothing() {
        let q = MemoryQueue::new(3, 0);
        q.push(rec("a")).await.unwrap();
        let err = q.push_many(vec![rec("b"), rec("c"), rec("d")]).await;
        assert_eq!(err, Err(QueueError::QueueFull { capacity: 3 }));
        assert_eq!(q.size().await.unwrap(), 1);

        q.push_many(vec![rec("b"), rec("c")]).await.unwrap();
        let names: Vec<_> = q
            .pop_many(10)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn retry_counts_attempt_and_bypasses_bound() {
        let q = MemoryQueue::new(1, 0);
        q.push(rec("a")).await.unwrap();
        q.retry(rec("b")).await.unwrap();
        assert_eq!(q.size().await.unwrap(), 2);

        q.pop().await.unwrap();
        let retried = q.pop().await.unwrap().unwrap();
        assert_eq!(retried.name, "b");
        assert_eq!(retried.attempts, 1);
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found() {
        let q = MemoryQueue::new(0, 0);
        let job = rec("a");
        let id = job.id.clone();
        q.push(job).await.unwrap();
        assert_eq!(
            q.delete("job-0").await,
            Err(QueueError::NotFound { id: "job-0".into() })
        );
        q.delete(&id).await.unwrap();
        assert_eq!(q.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_set_evicts_oldest() {
        let q = MemoryQueue::new(0, 2);
        for name in ["a", "b", "c"] {
            q.fail(rec(name), format!("{name} broke")).await.unwrap();
        }
        let failed = q.failed().await.unwrap();
        let errors: Vec<_> = failed.iter().map(|f| f.error.as_str()).collect();
        assert_eq!(errors, vec!["b broke", "c broke"]);

        assert_eq!(q.drain_failed().await.unwrap().len(), 2);
        assert_eq!(q.failed_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn bpop_wakes_on_push() {
        let q = Arc::new(MemoryQueue::new(0, 0));
        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.bpop(&Context::background()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(rec("late")).await.unwrap();

        let job = consumer.await.unwrap().unwrap();
        assert_eq!(job.name, "late");
    }

    #[tokio::test]
    async fn bpop_honors_deadline() {
        let q: MemoryQueue<Noop> = MemoryQueue::new(0, 0);
        let (ctx, _release) = Context::background().with_timeout(Duration::from_millis(20));
        assert_eq!(
            q.bpop(&ctx).await.err(),
            Some(QueueError::Context(ContextError::DeadlineExceeded))
        );
    }

    #[tokio::test]
    async fn ctx_variants_refuse_fired_context() {
        let q = MemoryQueue::new(0, 0);
        let (ctx, release) = Context::background().with_cancel();
        release.release();
        assert_eq!(
            q.push_ctx(&ctx, rec("a")).await,
            Err(QueueError::Context(ContextError::Cancelled))
        );
        assert_eq!(q.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_queue_refuses_pushes_and_releases_consumers() {
        let q: MemoryQueue<Noop> = MemoryQueue::new(0, 0);
        q.close();
        assert_eq!(q.push(rec("a")).await, Err(QueueError::Closed));
        assert_eq!(q.bpop(&Context::background()).await.err(), Some(QueueError::Closed));
    }
}
