//! Retry policies for failed jobs.
//!
//! ## Contents
//! - [`RetryPolicy`]   when a failed job goes back on the queue (now / after a delay)
//! - [`BackoffPolicy`] how delays evolve across attempts (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization to spread retries of many jobs
//!
//! ## Quick wiring
//! ```text
//! [queue] retry_policy / retry_delay_ms / retry_factor / retry_max_delay_ms / retry_jitter
//!      └─► QueueConfig::retry_policy_for(job) → RetryPolicy
//!           └─► JobWorker waits retry.delay(attempt) (cancellable), then Queue::retry
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::Backoff(BackoffPolicy::default())`
//! - `BackoffPolicy::default()` → first=1s, factor=2.0, max=60s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
