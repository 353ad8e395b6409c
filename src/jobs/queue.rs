//! # Queue contract.
//!
//! Every driver implements the plain operations. The `*_ctx` variants wrap
//! them so a fired [`Context`] interrupts the call with
//! [`QueueError::Context`]; drivers may override them when the backend can
//! cancel natively.

use std::future::Future;

use async_trait::async_trait;

use super::job::{FailedJob, QueuedJob};
use crate::context::Context;
use crate::error::{ContextError, QueueError};

/// Storage for pending and failed jobs. FIFO per queue.
#[async_trait]
pub trait Queue<J>: Send + Sync + 'static
where
    J: Send + Sync + 'static,
{
    /// Appends a job. Fails with [`QueueError::QueueFull`] on a full bounded queue.
    async fn push(&self, job: QueuedJob<J>) -> Result<(), QueueError>;

    /// Appends all jobs or none.
    async fn push_many(&self, jobs: Vec<QueuedJob<J>>) -> Result<(), QueueError>;

    /// Removes the head, or `None` when empty.
    async fn pop(&self) -> Result<Option<QueuedJob<J>>, QueueError>;

    /// Removes the head, waiting until one exists or `ctx` fires.
    async fn bpop(&self, ctx: &Context) -> Result<QueuedJob<J>, QueueError>;

    /// Removes up to `n` jobs from the head.
    async fn pop_many(&self, n: usize) -> Result<Vec<QueuedJob<J>>, QueueError>;

    /// Counts one more attempt and appends the job to the tail.
    ///
    /// Retries are accepted even when the queue is at capacity.
    async fn retry(&self, job: QueuedJob<J>) -> Result<(), QueueError>;

    /// Moves the job to the failed set.
    async fn fail(&self, job: QueuedJob<J>, error: String) -> Result<(), QueueError>;

    /// Number of pending jobs.
    async fn size(&self) -> Result<usize, QueueError>;

    /// Drops every pending job.
    async fn clear(&self) -> Result<(), QueueError>;

    /// Removes a pending job by id; [`QueueError::NotFound`] if absent.
    async fn delete(&self, id: &str) -> Result<(), QueueError>;

    /// Snapshot of the failed set, oldest first.
    async fn failed(&self) -> Result<Vec<FailedJob<J>>, QueueError>;

    /// Takes the whole failed set, oldest first.
    async fn drain_failed(&self) -> Result<Vec<FailedJob<J>>, QueueError>;

    /// Number of failed jobs held.
    async fn failed_size(&self) -> Result<usize, QueueError>;

    async fn push_ctx(&self, ctx: &Context, job: QueuedJob<J>) -> Result<(), QueueError> {
        guarded(ctx, self.push(job)).await
    }

    async fn push_many_ctx(&self, ctx: &Context, jobs: Vec<QueuedJob<J>>) -> Result<(), QueueError> {
        guarded(ctx, self.push_many(jobs)).await
    }

    async fn pop_ctx(&self, ctx: &Context) -> Result<Option<QueuedJob<J>>, QueueError> {
        guarded(ctx, self.pop()).await
    }

    async fn pop_many_ctx(&self, ctx: &Context, n: usize) -> Result<Vec<QueuedJob<J>>, QueueError> {
        guarded(ctx, self.pop_many(n)).await
    }

    async fn retry_ctx(&self, ctx: &Context, job: QueuedJob<J>) -> Result<(), QueueError> {
        guarded(ctx, self.retry(job)).await
    }

    async fn fail_ctx(&self, ctx: &Context, job: QueuedJob<J>, error: String) -> Result<(), QueueError> {
        guarded(ctx, self.fail(job, error)).await
    }

    async fn size_ctx(&self, ctx: &Context) -> Result<usize, QueueError> {
        guarded(ctx, self.size()).await
    }

    async fn clear_ctx(&self, ctx: &Context) -> Result<(), QueueError> {
        guarded(ctx, self.clear()).await
    }

    async fn delete_ctx(&self, ctx: &Context, id: &str) -> Result<(), QueueError> {
        guarded(ctx, self.delete(id)).await
    }
}

/// Runs `op` unless `ctx` has fired or fires first.
pub(crate) async fn guarded<R, F>(ctx: &Context, op: F) -> Result<R, QueueError>
where
    F: Future<Output = Result<R, QueueError>>,
{
    ctx.check()?;
    tokio::select! {
        biased;
        res = op => res,
        _ = ctx.cancelled() => Err(ctx.err().unwrap_or(ContextError::Cancelled).into()),
    }
}
