//! # Job dispatch.
//!
//! ```text
//! dispatch(ctx, job)
//!   ├─ driver = sync            → run now on the caller
//!   ├─ job.should_queue() None  → run now on the caller
//!   └─ Some(marker)             → QueuedJob { fresh id, attempts 0, budget } → queue.push_ctx
//! ```
//!
//! Synchronous runs go through [`ContextManager`], so they get the same
//! deadline handling and panic isolation as queued ones.

use std::sync::Arc;
use std::time::Duration;

use super::config::{Driver, QueueConfig};
use super::job::{Job, QueuedJob, ShouldQueue};
use super::queue::Queue;
use crate::context::{Context, ContextManager};
use crate::error::{JobError, TaskError};

/// Outcome of [`Dispatcher::dispatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Pushed to the queue under this id.
    Queued { id: String },
    /// Ran to success on the caller.
    Executed,
}

/// Routes jobs to the queue or runs them inline.
pub struct Dispatcher<J> {
    cfg: QueueConfig,
    queue: Arc<dyn Queue<J>>,
    contexts: ContextManager,
}

impl<J> Clone for Dispatcher<J> {
    fn clone(&self) -> Self {
        Self {
            cfg: self.cfg.clone(),
            queue: Arc::clone(&self.queue),
            contexts: self.contexts.clone(),
        }
    }
}

impl<J: Job> Dispatcher<J> {
    pub fn new(cfg: QueueConfig, queue: Arc<dyn Queue<J>>, contexts: ContextManager) -> Self {
        Self { cfg, queue, contexts }
    }

    /// Queue receiving dispatched jobs.
    pub fn queue(&self) -> &Arc<dyn Queue<J>> {
        &self.queue
    }

    /// Queues `job` if it asks for it and the driver allows, else runs it now.
    ///
    /// Queue failures (full, closed, `ctx` fired) are returned as
    /// [`JobError::Queue`]; inline failures as [`JobError::Handler`].
    pub async fn dispatch(&self, ctx: &Context, job: J) -> Result<Dispatched, JobError> {
        let marker = match (self.cfg.driver, job.should_queue()) {
            (Driver::Memory, Some(marker)) => marker,
            _ => {
                self.dispatch_sync(ctx, job).await?;
                return Ok(Dispatched::Executed);
            }
        };

        let record = self.record(job, marker);
        let id = record.id.clone();
        let name = record.name.clone();
        self.queue.push_ctx(ctx, record).await?;
        tracing::debug!(job = %id, %name, "job queued");
        Ok(Dispatched::Queued { id })
    }

    /// Runs `job` on the caller regardless of its queue marker.
    pub async fn dispatch_sync(&self, ctx: &Context, job: J) -> Result<(), JobError> {
        let timeout = job
            .should_queue()
            .and_then(|m| m.timeout)
            .or_else(|| self.cfg.timeout_for(job.name()));
        let name = job.name().to_string();

        let res = run_job(&self.contexts, ctx, Arc::new(job), timeout).await;
        if let Err(e) = &res {
            tracing::warn!(%name, error = %e, "sync job failed");
        }
        res.map_err(JobError::from)
    }

    fn record(&self, job: J, marker: ShouldQueue) -> QueuedJob<J> {
        let name = job.name();
        let budget = marker
            .max_retries
            .unwrap_or_else(|| self.cfg.max_attempts_for(name))
            .max(1);
        let timeout = marker.timeout.or_else(|| self.cfg.timeout_for(name));
        QueuedJob::new(job, budget, timeout)
    }
}

/// Runs one attempt of `job` in a fresh scope under `parent`.
pub(crate) async fn run_job<J: Job>(
    contexts: &ContextManager,
    parent: &Context,
    job: Arc<J>,
    timeout: Option<Duration>,
) -> Result<(), TaskError> {
    let op = move |ctx: Context| async move { job.handle(ctx).await };
    match timeout {
        Some(d) => contexts.execute_with_timeout(parent, d, op).await,
        None => contexts.execute_with_context(parent, op).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::MemoryQueue;
    use crate::error::QueueError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Count {
        queued: bool,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for Count {
        fn name(&self) -> &str {
            "count"
        }

        async fn handle(&self, _ctx: Context) -> Result<(), TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn should_queue(&self) -> Option<ShouldQueue> {
            self.queued.then(|| ShouldQueue::default().max_retries(7))
        }
    }

    fn setup(driver: Driver, capacity: usize) -> (Dispatcher<Count>, Arc<MemoryQueue<Count>>) {
        let queue = Arc::new(MemoryQueue::<Count>::new(capacity, 0));
        let cfg = QueueConfig {
            driver,
            ..QueueConfig::default()
        };
        let d = Dispatcher::new(cfg, queue.clone(), ContextManager::default());
        (d, queue)
    }

    #[tokio::test]
    async fn marked_jobs_are_queued_with_their_budget() {
        let (d, queue) = setup(Driver::Memory, 0);
        let runs = Arc::new(AtomicUsize::new(0));
        let out = d
            .dispatch(&Context::background(), Count { queued: true, runs: runs.clone() })
            .await
            .unwrap();

        let Dispatched::Queued { id } = out else {
            panic!("expected a queued job, got {out:?}");
        };
        let rec = queue.pop().await.unwrap().unwrap();
        assert_eq!(rec.id, id);
        assert_eq!(rec.attempts, 0);
        assert_eq!(rec.max_retries, 7);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmarked_jobs_run_inline() {
        let (d, queue) = setup(Driver::Memory, 0);
        let runs = Arc::new(AtomicUsize::new(0));
        let out = d
            .dispatch(&Context::background(), Count { queued: false, runs: runs.clone() })
            .await
            .unwrap();
        assert_eq!(out, Dispatched::Executed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sync_driver_ignores_the_marker() {
        let (d, queue) = setup(Driver::Sync, 0);
        let runs = Arc::new(AtomicUsize::new(0));
        let out = d
            .dispatch(&Context::background(), Count { queued: true, runs: runs.clone() })
            .await
            .unwrap();
        assert_eq!(out, Dispatched::Executed);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn full_queue_surfaces_as_queue_error() {
        let (d, _queue) = setup(Driver::Memory, 1);
        let runs = Arc::new(AtomicUsize::new(0));
        let ctx = Context::background();
        d.dispatch(&ctx, Count { queued: true, runs: runs.clone() })
            .await
            .unwrap();
        let err = d
            .dispatch(&ctx, Count { queued: true, runs })
            .await
            .unwrap_err();
        assert_eq!(err, JobError::Queue(QueueError::QueueFull { capacity: 1 }));
    }
}
