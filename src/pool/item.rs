//! # Work items and their completion handles.
//!
//! A [`WorkItem<T>`] pairs a payload with a one-shot async handler. On
//! submission it is erased into a [`Runnable`], so one pool serves items of
//! any payload type.
//!
//! ```text
//! WorkItem<T> { id, priority, payload, handler, timeout?, ctx? }
//!      └─► Runnable { id, priority, timeout, ctx, run: Box<FnOnce(Context) -> BoxWorkFuture>, done? }
//!               └─ done: oneshot sender feeding a Completion
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskCx, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::context::Context;
use crate::error::TaskError;
use crate::primitives::IdGenerator;

/// Future produced by an erased work item.
pub type BoxWorkFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

type ErasedRun = Box<dyn FnOnce(Context) -> BoxWorkFuture + Send + 'static>;

static ITEM_IDS: IdGenerator = IdGenerator::new("work");

/// Closure plus payload scheduled on the [`TaskPool`](super::TaskPool).
///
/// `priority` selects the target worker (`priority mod workers`).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use worklane::{TaskError, WorkItem};
///
/// let item = WorkItem::new(0, 21u32, |_ctx, n| async move {
///     assert_eq!(n * 2, 42);
///     Ok::<_, TaskError>(())
/// })
/// .with_timeout(Duration::from_secs(1));
/// assert!(item.id().starts_with("work-"));
/// ```
pub struct WorkItem<T> {
    id: String,
    priority: usize,
    payload: T,
    handler: Box<dyn FnOnce(Context, T) -> BoxWorkFuture + Send + 'static>,
    timeout: Option<Duration>,
    ctx: Option<Context>,
}

impl<T: Send + 'static> WorkItem<T> {
    /// Creates an item with a generated id.
    pub fn new<F, Fut>(priority: usize, payload: T, handler: F) -> Self
    where
        F: FnOnce(Context, T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            id: ITEM_IDS.next_id(),
            priority,
            payload,
            handler: Box::new(move |ctx, payload| Box::pin(handler(ctx, payload))),
            timeout: None,
            ctx: None,
        }
    }

    /// Overrides the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Bounds handler execution.
    ///
    /// A zero duration hands the handler a context that is already cancelled.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parent context the handler's context is derived from.
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = Some(ctx);
        self
    }

    /// Item id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Routing priority.
    pub fn priority(&self) -> usize {
        self.priority
    }

    pub(crate) fn into_runnable(self, done: Option<oneshot::Sender<Result<(), TaskError>>>) -> Runnable {
        let WorkItem {
            id,
            priority,
            payload,
            handler,
            timeout,
            ctx,
        } = self;
        Runnable {
            id,
            priority,
            timeout,
            ctx,
            // The handler is invoked inside the future so a panicking
            // closure is caught together with its body.
            run: Box::new(move |ctx| Box::pin(async move { handler(ctx, payload).await })),
            done,
        }
    }
}

impl<T> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Type-erased item resident in exactly one deque, the overflow queue, or a
/// worker's hands.
pub(crate) struct Runnable {
    pub id: String,
    pub priority: usize,
    pub timeout: Option<Duration>,
    pub ctx: Option<Context>,
    pub run: ErasedRun,
    pub done: Option<oneshot::Sender<Result<(), TaskError>>>,
}

impl Runnable {
    /// Reports the final result to a waiting [`Completion`], if any.
    pub fn complete(done: Option<oneshot::Sender<Result<(), TaskError>>>, res: Result<(), TaskError>) {
        if let Some(tx) = done {
            let _ = tx.send(res);
        }
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable").field("id", &self.id).finish()
    }
}

/// Resolves with a submitted item's final handler result.
///
/// Resolves to [`TaskError::Cancelled`] if the item was dropped unexecuted.
#[derive(Debug)]
#[must_use = "a Completion does nothing unless awaited"]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), TaskError>>,
}

impl Completion {
    pub(crate) fn channel() -> (oneshot::Sender<Result<(), TaskError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl Future for Completion {
    type Output = Result<(), TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskCx<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(TaskError::Cancelled)))
    }
}
