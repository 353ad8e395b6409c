//! # Run operations inside a deadline/cancellation scope.
//!
//! [`ContextManager`] derives contexts under [`ContextConfig`] policy and runs
//! user operations inside them.
//!
//! ## Flow
//! ```text
//! execute_with_timeout(parent, d, op)
//!   ├─► derive ctx (deadline = min(parent, now + cap(d)))
//!   ├─► spawn op(ctx)                         ─┐
//!   └─► select (biased)                        │ op keeps running after the
//!         ├─ op finished   → its result        │ scope returns and observes
//!         └─ ctx fired     → DeadlineExceeded  │ the released ctx on its next
//!                            or Cancelled     ─┘ sample
//!   release(ctx) on every exit
//! ```
//!
//! ## Rules
//! - The operation result wins a tie with the deadline.
//! - A panic in the operation is returned as [`TaskError::Panicked`].
//! - An already-fired context returns its error without starting the operation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::config::ContextConfig;
use super::context::{Context, ContextValue, Derive, Release};
use crate::error::{ContextError, TaskError};

/// Derives contexts and executes scoped operations.
#[derive(Clone, Debug, Default)]
pub struct ContextManager {
    cfg: ContextConfig,
}

impl ContextManager {
    /// Creates a manager applying `cfg`.
    pub fn new(cfg: ContextConfig) -> Self {
        Self { cfg }
    }

    /// Active policy.
    pub fn config(&self) -> &ContextConfig {
        &self.cfg
    }

    /// Root context.
    pub fn background(&self) -> Context {
        Context::background()
    }

    /// Derives a cancellable child.
    pub fn with_cancel(&self, parent: &Context) -> (Context, Release) {
        self.derive(parent, None)
    }

    /// Derives a child cancelled after `timeout` (capped at `max_timeout_sec`).
    pub fn with_timeout(&self, parent: &Context, timeout: Duration) -> (Context, Release) {
        let at = Instant::now().checked_add(self.cfg.cap(timeout));
        self.derive(parent, at)
    }

    /// Derives a child with an explicit deadline (capped at `now + max_timeout_sec`).
    pub fn with_deadline(&self, parent: &Context, deadline: Instant) -> (Context, Release) {
        let capped = match self.cfg.max_timeout() {
            Some(max) => Instant::now()
                .checked_add(max)
                .map_or(deadline, |limit| deadline.min(limit)),
            None => deadline,
        };
        self.derive(parent, Some(capped))
    }

    /// Derives a child with the configured default timeout, or no deadline if unset.
    pub fn with_default_timeout(&self, parent: &Context) -> (Context, Release) {
        match self.cfg.default_timeout() {
            Some(d) => self.with_timeout(parent, d),
            None => self.with_cancel(parent),
        }
    }

    /// Derives a child carrying `values`.
    ///
    /// With `propagate_values = false` the child sees only `values`.
    pub fn with_values<I, K>(&self, parent: &Context, values: I) -> Context
    where
        I: IntoIterator<Item = (K, ContextValue)>,
        K: Into<String>,
    {
        parent.derive(Derive {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            linked: self.cfg.enable_cancellation,
            isolated: !self.cfg.propagate_values,
            deadline: None,
        })
    }

    /// Runs `op` under a deadline of `timeout` derived from `parent`.
    ///
    /// Returns `op`'s result, or [`TaskError::DeadlineExceeded`] if the
    /// deadline fires first. The operation is signalled through its context
    /// and may finish after this call returns; its result is then discarded.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use worklane::{Context, ContextManager, TaskError};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mgr = ContextManager::default();
    /// let res = mgr
    ///     .execute_with_timeout(&Context::background(), Duration::from_millis(10), |ctx| async move {
    ///         ctx.cancelled().await;
    ///         Ok::<_, TaskError>("never")
    ///     })
    ///     .await;
    /// assert_eq!(res, Err(TaskError::DeadlineExceeded));
    /// # }
    /// ```
    pub async fn execute_with_timeout<F, Fut, R>(
        &self,
        parent: &Context,
        timeout: Duration,
        op: F,
    ) -> Result<R, TaskError>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
        R: Send + 'static,
    {
        let (ctx, release) = self.with_timeout(parent, timeout);
        scoped(ctx, release, op).await
    }

    /// Runs `op` in a cancellable child of `parent` without adding a deadline.
    ///
    /// Returns [`TaskError::Cancelled`] (or the parent's deadline error) if
    /// `parent` fires first.
    pub async fn execute_with_context<F, Fut, R>(&self, parent: &Context, op: F) -> Result<R, TaskError>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
        R: Send + 'static,
    {
        let (ctx, release) = self.with_cancel(parent);
        scoped(ctx, release, op).await
    }

    fn derive(&self, parent: &Context, deadline: Option<Instant>) -> (Context, Release) {
        let ctx = parent.derive(Derive {
            deadline: deadline.filter(|_| self.cfg.enable_deadline),
            linked: self.cfg.enable_cancellation,
            isolated: !self.cfg.propagate_values,
            ..Derive::linked()
        });
        let release = Release::for_context(&ctx);
        (ctx, release)
    }
}

async fn scoped<F, Fut, R>(ctx: Context, release: Release, op: F) -> Result<R, TaskError>
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = Result<R, TaskError>> + Send + 'static,
    R: Send + 'static,
{
    if let Err(e) = ctx.check() {
        return Err(e.into());
    }

    let mut handle = tokio::spawn(op(ctx.clone()));
    let res = tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(r) => r,
            Err(e) if e.is_panic() => Err(TaskError::from_panic(e.into_panic())),
            Err(_) => Err(TaskError::Cancelled),
        },
        _ = ctx.cancelled() => {
            let err = ctx.err().unwrap_or(ContextError::Cancelled);
            tracing::debug!(reason = err.as_label(), "scope fired before operation completed");
            Err(err.into())
        }
    };

    release.release();
    res
}
