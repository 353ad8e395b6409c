//! # Context: deadline + cancellation + values.
//!
//! A [`Context`] is cheap to clone (one `Arc`) and immutable once built.
//! New contexts are derived from a parent:
//! - [`Context::with_cancel`], [`Context::with_timeout`], [`Context::with_deadline`]
//!   return the child together with a [`Release`] guard;
//! - [`Context::with_value`], [`Context::with_values`] return the child only.
//!
//! ## Rules
//! - A child is cancelled at the earliest of: parent cancellation, its own
//!   deadline, explicit release.
//! - A child's deadline is never later than its parent's.
//! - Once cancelled, every later reader observes the same [`ContextError`].
//! - Value lookup walks towards the root and returns the nearest binding.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use worklane::{Context, ContextError};
//!
//! let root = Context::background().with_value("rid", String::from("r-1"));
//! let (ctx, release) = root.with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ctx.value::<String>("rid").as_deref().map(String::as_str), Some("r-1"));
//! assert!(!ctx.is_cancelled());
//!
//! release.release();
//! assert_eq!(ctx.err(), Some(ContextError::Cancelled));
//! assert!(!root.is_cancelled());
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::ContextError;

/// Opaque value stored in a context.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Request-scoped handle passed to every handler.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    parent: Option<Context>,
    token: CancellationToken,
    deadline: Option<Instant>,
    values: HashMap<String, ContextValue>,
    /// Cancellation follows the parent.
    linked: bool,
    /// Value lookup stops at this node.
    isolated: bool,
    cause: OnceLock<ContextError>,
}

/// How a child context relates to its parent.
pub(crate) struct Derive {
    pub deadline: Option<Instant>,
    pub values: HashMap<String, ContextValue>,
    pub linked: bool,
    pub isolated: bool,
}

impl Derive {
    pub(crate) fn linked() -> Self {
        Self {
            deadline: None,
            values: HashMap::new(),
            linked: true,
            isolated: false,
        }
    }
}

impl Context {
    /// Root context: no deadline, no values, never cancelled.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                parent: None,
                token: CancellationToken::new(),
                deadline: None,
                values: HashMap::new(),
                linked: false,
                isolated: false,
                cause: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn derive(&self, opts: Derive) -> Self {
        let (token, deadline) = if opts.linked {
            let deadline = match (self.inner.deadline, opts.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            (self.inner.token.child_token(), deadline)
        } else {
            (CancellationToken::new(), opts.deadline)
        };

        Self {
            inner: Arc::new(Inner {
                parent: Some(self.clone()),
                token,
                deadline,
                values: opts.values,
                linked: opts.linked,
                isolated: opts.isolated,
                cause: OnceLock::new(),
            }),
        }
    }

    /// Derives a child that is cancelled when the returned [`Release`] fires.
    pub fn with_cancel(&self) -> (Context, Release) {
        let ctx = self.derive(Derive::linked());
        let release = Release::for_context(&ctx);
        (ctx, release)
    }

    /// Derives a child cancelled at `deadline` (or earlier if the parent fires).
    pub fn with_deadline(&self, deadline: Instant) -> (Context, Release) {
        let ctx = self.derive(Derive {
            deadline: Some(deadline),
            ..Derive::linked()
        });
        let release = Release::for_context(&ctx);
        (ctx, release)
    }

    /// Derives a child cancelled after `timeout` elapses.
    ///
    /// A zero timeout yields a context that is already cancelled.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, Release) {
        match Instant::now().checked_add(timeout) {
            Some(at) => self.with_deadline(at),
            None => self.with_cancel(),
        }
    }

    /// Derives a child carrying one additional value.
    pub fn with_value<V>(&self, key: impl Into<String>, value: V) -> Context
    where
        V: Any + Send + Sync,
    {
        self.with_values([(key.into(), Arc::new(value) as ContextValue)])
    }

    /// Derives a child carrying additional key/value pairs.
    ///
    /// Keys shadow bindings of the same name further up the chain.
    pub fn with_values<I, K>(&self, values: I) -> Context
    where
        I: IntoIterator<Item = (K, ContextValue)>,
        K: Into<String>,
    {
        self.derive(Derive {
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Derive::linked()
        })
    }

    /// Deadline of this context, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline (`None` without deadline).
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once the context fired (cancelled, released, or past its deadline).
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context fired, or `None` while it is live.
    pub fn err(&self) -> Option<ContextError> {
        let inner = &self.inner;
        if let Some(cause) = inner.cause.get() {
            return Some(*cause);
        }
        if self.deadline_passed() {
            return Some(self.fire(ContextError::DeadlineExceeded));
        }
        if inner.token.is_cancelled() {
            let inherited = match (&inner.parent, inner.linked) {
                (Some(parent), true) => parent.err().unwrap_or(ContextError::Cancelled),
                _ => ContextError::Cancelled,
            };
            return Some(self.fire(inherited));
        }
        None
    }

    /// `Err` once the context fired; handy with `?` at sampling points.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Completes when the context fires.
    pub async fn cancelled(&self) {
        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.inner.token.cancelled() => {}
                    _ = time::sleep_until(deadline) => {
                        self.fire(ContextError::DeadlineExceeded);
                    }
                }
            }
            None => self.inner.token.cancelled().await,
        }
    }

    /// Looks up `key` from this context towards the root and downcasts it.
    ///
    /// Returns `None` when the nearest binding has a different type.
    pub fn value<V>(&self, key: &str) -> Option<Arc<V>>
    where
        V: Any + Send + Sync,
    {
        self.raw_value(key).and_then(|v| v.downcast::<V>().ok())
    }

    /// Looks up `key` without downcasting.
    pub fn raw_value(&self, key: &str) -> Option<ContextValue> {
        let mut cur = Some(self);
        while let Some(ctx) = cur {
            if let Some(v) = ctx.inner.values.get(key) {
                return Some(Arc::clone(v));
            }
            if ctx.inner.isolated {
                return None;
            }
            cur = ctx.inner.parent.as_ref();
        }
        None
    }

    fn deadline_passed(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Records `cause` (first writer wins) and trips the token.
    fn fire(&self, cause: ContextError) -> ContextError {
        let _ = self.inner.cause.set(cause);
        self.inner.token.cancel();
        self.inner.cause.get().copied().unwrap_or(cause)
    }

    fn release(&self) {
        let cause = if self.deadline_passed() {
            ContextError::DeadlineExceeded
        } else {
            ContextError::Cancelled
        };
        self.fire(cause);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .field("values", &self.inner.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Cancels its derived context on [`Release::release`] or on drop.
///
/// Releasing twice is the same as releasing once. Hold the guard for as long
/// as the context should live; binding it to `_` releases immediately.
#[must_use = "dropping a Release cancels its context immediately"]
pub struct Release {
    ctx: Context,
}

impl Release {
    pub(crate) fn for_context(ctx: &Context) -> Self {
        Self { ctx: ctx.clone() }
    }

    /// Cancels the derived context. Idempotent.
    pub fn release(&self) {
        self.ctx.release();
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        self.ctx.release();
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Release")
            .field("released", &self.ctx.inner.cause.get().is_some())
            .finish()
    }
}
