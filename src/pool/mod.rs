//! Work-stealing task pool.
//!
//! ## Contents
//! - [`TaskPool`] admission, metrics and shutdown
//! - [`WorkItem`] payload plus async handler; [`Completion`] awaits its result
//! - [`PoolConfig`] sizing, stealing and scaling knobs
//! - [`PoolMetrics`] / [`WorkerMetrics`] counter snapshots
//!
//! Every worker owns a bounded local deque; a shared bounded overflow queue
//! takes what does not fit. Idle workers steal from busy ones, and an optional
//! controller grows or shrinks the roster between `min_workers` and `max_workers`.

mod config;
mod core;
mod item;
mod metrics;
mod scaler;
mod worker;

pub use config::PoolConfig;
pub use core::TaskPool;
pub use item::{BoxWorkFuture, Completion, WorkItem};
pub use metrics::{PoolMetrics, WorkerMetrics};
