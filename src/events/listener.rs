//! # Event listeners.
//!
//! [`Listener`] is the extension point; [`ListenerFn`] adapts a closure.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use worklane::{Context, Event, Listener, ListenerFn, ListenerRef, TaskError};
//!
//! let greet: ListenerRef<String> = ListenerFn::arc("greet", |_ctx: Context, ev: Arc<Event<String>>| async move {
//!     if ev.payload.is_empty() {
//!         return Err(TaskError::fail("no name"));
//!     }
//!     Ok(())
//! });
//! assert_eq!(greet.name(), "greet");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::event::Event;
use crate::context::Context;
use crate::error::TaskError;

/// Callback registered under an event name.
///
/// Implementations should sample `ctx` in long operations and return when it fires.
#[async_trait]
pub trait Listener<T>: Send + Sync + 'static {
    /// Stable name used in logs and aggregated errors.
    fn name(&self) -> &str;

    /// Handles one event.
    async fn handle(&self, ctx: Context, event: Arc<Event<T>>) -> Result<(), TaskError>;
}

/// Shared listener handle.
pub type ListenerRef<T> = Arc<dyn Listener<T>>;

/// Closure-backed listener.
#[derive(Debug)]
pub struct ListenerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ListenerFn<F> {
    /// Wraps `f`; prefer [`ListenerFn::arc`] when registering right away.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Wraps `f` into a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<T, F, Fut> Listener<T> for ListenerFn<F>
where
    T: Send + Sync + 'static,
    F: Fn(Context, Arc<Event<T>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: Context, event: Arc<Event<T>>) -> Result<(), TaskError> {
        (self.f)(ctx, event).await
    }
}
