//! # Composition root.
//!
//! [`Runtime`] wires every component from one [`Config`](crate::Config):
//!
//! ```text
//! Runtime::builder(cfg) ─► RuntimeBuilder ─► build()
//!   ├─ TaskPool          (cfg.pool, started immediately)
//!   ├─ ContextManager    (cfg.context)
//!   ├─ EventBus<E>       (cfg.events, async dispatch on the pool, optional store)
//!   ├─ MemoryQueue<J>    (cfg.queue bounds)
//!   ├─ Dispatcher<J>     (routes jobs to the queue or the caller)
//!   └─ JobWorker<J>      (started by start())
//!
//! shutdown():
//!   close queue ─► stop job worker (in-flight settle) ─► drain pool
//!   └── all within cfg.shutdown_grace_ms, else RuntimeError::GraceExceeded
//! ```

mod builder;
#[allow(clippy::module_inception)]
mod runtime;
mod signal;

pub use builder::RuntimeBuilder;
pub use runtime::Runtime;
