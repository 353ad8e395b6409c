//! # Job dispatch, queueing and retries.
//!
//! ```text
//! Dispatcher::dispatch(ctx, job)
//!   ├─ inline:  ContextManager scope → Job::handle
//!   └─ queued:  Queue::push ──► JobWorker pump ──► TaskPool ──► Job::handle
//!                                   ▲                             │ retryable error
//!                                   └──── Queue::retry ◄──────────┘ (RetryPolicy delay)
//!                                                                 │ final error
//!                                                                 ▼
//!                                                          Queue::fail (failed set)
//! ```
//!
//! ## Contents
//! - [`Job`], [`ShouldQueue`]           the work contract and its queue marker
//! - [`QueuedJob`], [`FailedJob`]       queue records
//! - [`Queue`], [`MemoryQueue`]         queue contract and in-process driver
//! - [`Dispatcher`]                     routes jobs to the queue or the caller
//! - [`JobWorker`]                      consumes the queue on the task pool
//! - [`QueueConfig`]                    driver, bounds and retry settings

mod config;
mod dispatcher;
mod job;
mod memory;
mod queue;
mod worker;

pub use config::{Driver, JobOverride, QueueConfig, RetryMode};
pub use dispatcher::{Dispatched, Dispatcher};
pub use job::{FailedJob, Job, QueuedJob, ShouldQueue};
pub use memory::MemoryQueue;
pub use queue::Queue;
pub use worker::{JobMetrics, JobWorker};
