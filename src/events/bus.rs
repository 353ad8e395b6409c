//! # Typed publish/subscribe bus.
//!
//! ## Dispatch flow
//! ```text
//! dispatch(ctx, event)
//!   ├─► name empty?                     → InvalidArgument
//!   ├─► store.store(&event)  (persist)  → StoreFailed, no listener runs
//!   ├─► snapshot listeners[name]        (read lock, Arc clone)
//!   └─► for L in snapshot, in order:
//!         ctx' = ctx.with_timeout(override) | ctx.with_cancel()
//!         spawn L.handle(ctx', Arc<Event>)  (panic caught; on ctx' firing the
//!                                            dispatch moves on, the listener keeps running)
//!   failures? → ListenersFailed(all of them) : Ok
//!
//! dispatch_async(ctx, event)
//!   ├─► take one of listener_pool_size permits  → Pool(Saturated) if none
//!   └─► TaskPool work item (holding the permit) running dispatch
//! ```
//!
//! ## Rules
//! - Listeners are never short-circuited: every one runs even after a failure.
//! - Persist happens before any listener runs.
//! - Synchronous dispatches from one caller keep that caller's order;
//!   asynchronous dispatches are unordered.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::config::EventConfig;
use super::event::Event;
use super::listener::ListenerRef;
use super::registry::{ListenerHandle, ListenerRegistry};
use super::store::EventStore;
use crate::context::Context;
use crate::error::{ContextError, EventError, ListenerFailure, ListenerFailures, PoolError, TaskError};
use crate::pool::{TaskPool, WorkItem};
use crate::primitives::AtomicCounter;

/// Name-keyed event bus for payloads of type `T`.
///
/// Cloning yields another handle to the same registry and store.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use worklane::{Context, Event, EventBus, EventConfig, ListenerFn, PoolConfig, TaskError, TaskPool};
///
/// # #[tokio::main]
/// # async fn main() {
/// let pool = TaskPool::new(PoolConfig { num_workers: 1, ..PoolConfig::default() }).unwrap();
/// let bus: EventBus<String> = EventBus::new(EventConfig::default(), pool.clone());
///
/// bus.listen(
///     "user.created",
///     ListenerFn::arc("welcome", |_ctx: Context, ev: Arc<Event<String>>| async move {
///         assert_eq!(ev.payload, "alice");
///         Ok::<_, TaskError>(())
///     }),
/// )
/// .unwrap();
///
/// bus.dispatch_event(&Context::background(), "user.created", "alice".to_string())
///     .await
///     .unwrap();
/// pool.shutdown().await;
/// # }
/// ```
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

struct BusInner<T> {
    cfg: EventConfig,
    registry: ListenerRegistry<T>,
    store: Option<Arc<dyn EventStore<T>>>,
    pool: TaskPool,
    async_slots: Arc<Semaphore>,
    async_seq: AtomicCounter,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> EventBus<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a bus without a store; asynchronous dispatch runs on `pool`.
    pub fn new(cfg: EventConfig, pool: TaskPool) -> Self {
        Self::build(cfg, pool, None)
    }

    /// Creates a bus persisting events to `store` before dispatch.
    pub fn with_store(cfg: EventConfig, pool: TaskPool, store: Arc<dyn EventStore<T>>) -> Self {
        Self::build(cfg, pool, Some(store))
    }

    fn build(cfg: EventConfig, pool: TaskPool, store: Option<Arc<dyn EventStore<T>>>) -> Self {
        let slots = cfg.listener_pool_size.max(1);
        Self {
            inner: Arc::new(BusInner {
                registry: ListenerRegistry::new(),
                store,
                pool,
                async_slots: Arc::new(Semaphore::new(slots)),
                async_seq: AtomicCounter::new(),
                cfg,
            }),
        }
    }

    /// Attached store, if any.
    pub fn store(&self) -> Option<&Arc<dyn EventStore<T>>> {
        self.inner.store.as_ref()
    }

    /// Appends `listener` to the list for `name`.
    ///
    /// Fails with [`EventError::InvalidArgument`] for an empty event or listener name.
    pub fn listen(&self, name: &str, listener: ListenerRef<T>) -> Result<ListenerHandle, EventError> {
        if name.trim().is_empty() {
            return Err(EventError::invalid("event name is empty"));
        }
        if listener.name().trim().is_empty() {
            return Err(EventError::invalid("listener name is empty"));
        }
        let handle = self.inner.registry.add(name, listener);
        tracing::debug!(event = name, registration = handle.id(), "listener registered");
        Ok(handle)
    }

    /// Removes the registration behind `handle`. Returns `false` if already gone.
    pub fn unlisten(&self, handle: &ListenerHandle) -> bool {
        self.inner.registry.remove_handle(handle)
    }

    /// Removes the first registration of `listener` (same `Arc`) under `name`.
    ///
    /// No-op if absent.
    pub fn remove_listener(&self, name: &str, listener: &ListenerRef<T>) -> bool {
        self.inner.registry.remove_listener(name, listener)
    }

    /// True if at least one listener is registered for `name`.
    pub fn has_listeners(&self, name: &str) -> bool {
        self.inner.registry.count(name) > 0
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner.registry.count(name)
    }

    /// Event names with at least one listener.
    pub fn event_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    /// Persists `event` (when a store is attached) and invokes its listeners in
    /// registration order on the calling task.
    pub async fn dispatch(&self, ctx: &Context, event: Event<T>) -> Result<(), EventError> {
        self.dispatch_shared(ctx, Arc::new(event)).await
    }

    /// Builds an event from `name` and `payload`, then [`dispatch`](Self::dispatch)es it.
    pub async fn dispatch_event(
        &self,
        ctx: &Context,
        name: impl Into<String>,
        payload: T,
    ) -> Result<(), EventError> {
        self.dispatch(ctx, Event::new(name, payload)).await
    }

    /// Schedules a dispatch on the task pool and returns immediately.
    ///
    /// The listeners receive contexts derived from `ctx`. Failures of the
    /// scheduled dispatch are logged. With `listener_pool_size` dispatches
    /// already admitted and unfinished, fails with [`PoolError::Saturated`].
    pub fn dispatch_async(&self, ctx: &Context, event: Event<T>) -> Result<(), EventError> {
        validate(&event)?;
        let Ok(permit) = Arc::clone(&self.inner.async_slots).try_acquire_owned() else {
            tracing::debug!(event = %event.name, limit = self.inner.cfg.listener_pool_size, "async dispatch limit reached");
            return Err(PoolError::Saturated {
                capacity: self.inner.cfg.listener_pool_size,
            }
            .into());
        };
        let bus = self.clone();
        let priority = self.inner.async_seq.incr() as usize;
        let item = WorkItem::new(priority, event, move |ctx, event: Event<T>| async move {
            let _permit = permit;
            let name = event.name.clone();
            bus.dispatch(&ctx, event).await.map_err(|e| {
                tracing::warn!(event = %name, error = %e, "async dispatch failed");
                TaskError::fail(e)
            })
        })
        .with_context(ctx.clone());
        self.inner.pool.submit(item)?;
        Ok(())
    }

    async fn dispatch_shared(&self, ctx: &Context, event: Arc<Event<T>>) -> Result<(), EventError> {
        validate(&event)?;
        let inner = &self.inner;

        if let Some(store) = &inner.store {
            if inner.cfg.persists(&event.name) {
                if let Err(e) = store.store(&event).await {
                    tracing::warn!(event = %event.name, id = %event.id, error = %e, "event store failed; dispatch aborted");
                    return Err(EventError::StoreFailed(e));
                }
            }
        }

        let Some(listeners) = inner.registry.snapshot(&event.name) else {
            return Ok(());
        };
        let timeout = inner.cfg.listener_timeout(&event.name);

        let mut failures = Vec::new();
        for reg in listeners.iter() {
            if let Err(error) = invoke(ctx, &reg.listener, Arc::clone(&event), timeout).await {
                tracing::warn!(
                    event = %event.name,
                    listener = reg.listener.name(),
                    error = %error,
                    "listener failed"
                );
                failures.push(ListenerFailure {
                    listener: reg.listener.name().to_string(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EventError::ListenersFailed(ListenerFailures {
                event: event.name.clone(),
                failures,
            }))
        }
    }
}

fn validate<T>(event: &Event<T>) -> Result<(), EventError> {
    if event.name.trim().is_empty() {
        return Err(EventError::invalid("event name is empty"));
    }
    Ok(())
}

async fn invoke<T>(
    parent: &Context,
    listener: &ListenerRef<T>,
    event: Arc<Event<T>>,
    timeout: Option<std::time::Duration>,
) -> Result<(), TaskError>
where
    T: Send + Sync + 'static,
{
    let (ctx, _release) = match timeout {
        Some(d) => parent.with_timeout(d),
        None => parent.with_cancel(),
    };
    let listener = Arc::clone(listener);
    let mut handle = tokio::spawn({
        let ctx = ctx.clone();
        async move { listener.handle(ctx, event).await }
    });
    tokio::select! {
        biased;
        joined = &mut handle => match joined {
            Ok(out) => out,
            Err(e) if e.is_panic() => Err(TaskError::from_panic(e.into_panic())),
            Err(_) => Err(TaskError::Cancelled),
        },
        _ = ctx.cancelled() => Err(ctx.err().unwrap_or(ContextError::Cancelled).into()),
    }
}

impl<T> std::fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.inner.registry.names())
            .field("store", &self.inner.store.is_some())
            .finish()
    }
}
