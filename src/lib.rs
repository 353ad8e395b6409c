//! # worklane
//!
//! **Worklane** is a cooperative concurrency core for async Rust services.
//!
//! It bundles four building blocks that share one runtime model (tokio tasks,
//! cancellation tokens, isolated panics):
//! - a work-stealing [`TaskPool`] with optional adaptive scaling
//! - deadline/cancellation [`Context`]s and a [`ContextManager`] that runs
//!   operations inside them
//! - a typed publish/subscribe [`EventBus`] with an optional [`EventStore`]
//! - a job [`Dispatcher`](jobs::Dispatcher) with a bounded queue, retries and
//!   a failed set
//!
//! ## Architecture
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │ Runtime (composition root, built from Config)    │
//!                 └───┬──────────────┬───────────────┬───────────────┘
//!                     ▼              ▼               ▼
//!            ┌──────────────┐ ┌─────────────┐ ┌───────────────────────┐
//!            │ EventBus<E>  │ │ContextManager│ │ Dispatcher<J>         │
//!            │ store-first, │ │ deadlines,   │ │ queue or run inline   │
//!            │ all listeners│ │ cancellation │ └──────────┬────────────┘
//!            └──────┬───────┘ └──────┬──────┘            ▼
//!                   │ async dispatch │ scopes    ┌───────────────────────┐
//!                   │                │           │ Queue<J> (MemoryQueue)│
//!                   │                │           └──────────┬────────────┘
//!                   │                │                      ▼ bpop
//!                   │                │           ┌───────────────────────┐
//!                   │                │           │ JobWorker<J>          │
//!                   │                │           │ retry / fail          │
//!                   ▼                ▼           └──────────┬────────────┘
//!            ┌──────────────────────────────────────────────▼────────────┐
//!            │ TaskPool                                                  │
//!            │  worker 0 ◄─steal─► worker 1 ◄─steal─► … worker N         │
//!            │  (own deque LIFO)   overflow queue (FIFO)   scaler        │
//!            └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Work item lifecycle
//! ```text
//! TaskPool::submit(item)
//!   ├─► deque[priority % workers] ──full──► overflow ──full──► PoolError::Saturated
//!   └─► worker picks it up (own pop / overflow / steal)
//!         ├─ derive Context (item timeout or cancel-only)
//!         ├─ spawn handler (panic caught; left running when the context fires first)
//!         └─ record outcome in worker metrics, resolve Completion
//! ```
//!
//! ## Features
//! | Area            | Description                                               | Key types                            |
//! |-----------------|-----------------------------------------------------------|--------------------------------------|
//! | **Pool**        | Work stealing, overflow, scaling, graceful shutdown       | [`TaskPool`], [`WorkItem`]           |
//! | **Contexts**    | Deadlines, cancellation trees, scoped values              | [`Context`], [`ContextManager`]      |
//! | **Events**      | Name-keyed listeners, aggregated failures, persistence    | [`EventBus`], [`Listener`]           |
//! | **Jobs**        | Dispatch, bounded queue, retries, failed set              | [`jobs::Dispatcher`], [`jobs::Queue`]|
//! | **Policies**    | Immediate or backoff retry with jitter                    | [`RetryPolicy`], [`BackoffPolicy`]   |
//! | **Config**      | TOML-backed options for every module                      | [`Config`]                           |
//!
//! ## Optional features
//! - `logging`: [`logging::init`] installs a `tracing-subscriber` console logger.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use worklane::{Config, Context, Event, ListenerFn, Runtime, TaskError};
//! use worklane::jobs::{Dispatched, Job, ShouldQueue};
//!
//! struct Thumbnail { image: String }
//!
//! #[async_trait::async_trait]
//! impl Job for Thumbnail {
//!     fn name(&self) -> &str { "thumbnail" }
//!
//!     async fn handle(&self, ctx: Context) -> Result<(), TaskError> {
//!         ctx.check()?;
//!         assert!(!self.image.is_empty());
//!         Ok(())
//!     }
//!
//!     fn should_queue(&self) -> Option<ShouldQueue> {
//!         Some(ShouldQueue::default().max_retries(3))
//!     }
//! }
//!
//! #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::from_toml_str(r#"
//!         [pool]
//!         num_workers = 2
//!     "#)?;
//!     let rt = Runtime::<String, Thumbnail>::builder(cfg).build()?;
//!     rt.start();
//!
//!     rt.events().listen(
//!         "upload.done",
//!         ListenerFn::arc("log", |_ctx: Context, ev: Arc<Event<String>>| async move {
//!             println!("uploaded {}", ev.payload);
//!             Ok::<_, TaskError>(())
//!         }),
//!     )?;
//!
//!     let ctx = Context::background();
//!     rt.events().dispatch_event(&ctx, "upload.done", "cat.png".to_string()).await?;
//!     let out = rt.dispatch(&ctx, Thumbnail { image: "cat.png".into() }).await?;
//!     assert!(matches!(out, Dispatched::Queued { .. }));
//!
//!     rt.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod events;
pub mod jobs;
pub mod policies;
pub mod pool;
pub mod primitives;

mod error;
mod runtime;

// ---- Public re-exports ----

pub use config::{Config, ConfigSource, TomlSource};
pub use context::{Context, ContextConfig, ContextManager, ContextValue, Release};
pub use error::{
    ConfigError, ContextError, EventError, JobError, ListenerFailure, ListenerFailures, PoolError,
    QueueError, RuntimeError, StoreError, TaskError,
};
pub use events::{
    Event, EventBus, EventConfig, EventOverride, EventStore, Listener, ListenerFn, ListenerHandle,
    ListenerRef, MemoryEventStore,
};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use pool::{Completion, PoolConfig, PoolMetrics, TaskPool, WorkItem, WorkerMetrics};
pub use runtime::{Runtime, RuntimeBuilder};

// Optional: console logging through tracing-subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub mod logging;
