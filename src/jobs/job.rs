//! # Jobs and their queue records.
//!
//! A [`Job`] is a named unit of deferred work. Jobs that return a
//! [`ShouldQueue`] marker are wrapped in a [`QueuedJob`] record and pushed to
//! the configured queue; all others run synchronously on the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::TaskError;
use crate::primitives::IdGenerator;

static JOB_IDS: IdGenerator = IdGenerator::new("job");

/// Marker requesting background execution.
///
/// Unset fields fall back to the queue configuration for the job's name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShouldQueue {
    /// Total attempts, including the first.
    pub max_retries: Option<u32>,
    /// Handler deadline.
    pub timeout: Option<Duration>,
}

impl ShouldQueue {
    /// Sets the attempt budget.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the handler deadline.
    pub fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

/// Unit of deferred work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use worklane::{Context, TaskError};
/// use worklane::jobs::{Job, ShouldQueue};
///
/// struct SendWelcome { user: String }
///
/// #[async_trait]
/// impl Job for SendWelcome {
///     fn name(&self) -> &str { "send_welcome" }
///
///     async fn handle(&self, _ctx: Context) -> Result<(), TaskError> {
///         if self.user.is_empty() {
///             return Err(TaskError::fatal("no recipient"));
///         }
///         Ok(())
///     }
///
///     fn should_queue(&self) -> Option<ShouldQueue> {
///         Some(ShouldQueue::default().max_retries(5))
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Name used for per-job configuration and logging.
    fn name(&self) -> &str;

    /// Executes the job. Long-running handlers should watch `ctx`.
    async fn handle(&self, ctx: Context) -> Result<(), TaskError>;

    /// `Some` to run on a queue worker instead of the caller.
    fn should_queue(&self) -> Option<ShouldQueue> {
        None
    }
}

/// Queue record wrapping a job.
///
/// The payload is shared so retries and the running handler see the same
/// value.
#[derive(Serialize, Deserialize)]
pub struct QueuedJob<J> {
    pub id: String,
    pub name: String,
    pub payload: Arc<J>,
    /// Attempts already made.
    pub attempts: u32,
    /// Total attempts allowed, including the first.
    pub max_retries: u32,
    /// Handler deadline in milliseconds.
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt.
    pub processed_at: Option<DateTime<Utc>>,
}

impl<J: Job> QueuedJob<J> {
    /// Wraps `job` with a fresh id and zero attempts.
    pub fn new(job: J, max_retries: u32, timeout: Option<Duration>) -> Self {
        Self {
            id: JOB_IDS.next_id(),
            name: job.name().to_string(),
            payload: Arc::new(job),
            attempts: 0,
            max_retries,
            timeout_ms: timeout.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

impl<J> QueuedJob<J> {
    /// Handler deadline, if any. `Some(0)` expires before the handler starts.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Whether a failed attempt may be retried.
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_retries
    }
}

impl<J> Clone for QueuedJob<J> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            payload: Arc::clone(&self.payload),
            attempts: self.attempts,
            max_retries: self.max_retries,
            timeout_ms: self.timeout_ms,
            created_at: self.created_at,
            processed_at: self.processed_at,
        }
    }
}

impl<J> fmt::Debug for QueuedJob<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("attempts", &self.attempts)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Job that exhausted its attempts or failed permanently.
#[derive(Serialize, Deserialize)]
pub struct FailedJob<J> {
    pub job: QueuedJob<J>,
    /// Rendered final error.
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl<J> Clone for FailedJob<J> {
    fn clone(&self) -> Self {
        Self {
            job: self.job.clone(),
            error: self.error.clone(),
            failed_at: self.failed_at,
        }
    }
}

impl<J> fmt::Debug for FailedJob<J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedJob")
            .field("job", &self.job)
            .field("error", &self.error)
            .field("failed_at", &self.failed_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Ping(u8);

    #[async_trait]
    impl Job for Ping {
        fn name(&self) -> &str {
            "ping"
        }

        async fn handle(&self, _ctx: Context) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn record_starts_fresh() {
        let rec = QueuedJob::new(Ping(1), 3, Some(Duration::from_millis(250)));
        assert!(rec.id.starts_with("job-"));
        assert_eq!(rec.name, "ping");
        assert_eq!(rec.attempts, 0);
        assert_eq!(rec.timeout(), Some(Duration::from_millis(250)));
        assert!(rec.processed_at.is_none());
    }

    #[test]
    fn zero_timeout_stays_a_deadline() {
        let rec = QueuedJob::new(Ping(1), 1, Some(Duration::ZERO));
        assert_eq!(rec.timeout_ms, Some(0));
        assert_eq!(rec.timeout(), Some(Duration::ZERO));
        assert_eq!(QueuedJob::new(Ping(1), 1, None).timeout(), None);
    }

    #[test]
    fn retry_budget_counts_the_first_attempt() {
        let mut rec = QueuedJob::new(Ping(1), 3, None);
        assert!(rec.can_retry());
        rec.attempts = 1;
        assert!(rec.can_retry());
        rec.attempts = 2;
        assert!(!rec.can_retry());

        let once = QueuedJob::new(Ping(1), 1, None);
        assert!(!once.can_retry());
    }

    #[test]
    fn record_serializes_with_payload() {
        let rec = QueuedJob::new(Ping(7), 2, None);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["name"], "ping");
        assert_eq!(json["payload"], 7);

        let back: QueuedJob<Ping> = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, rec.id);
        assert_eq!(back.payload.0, 7);
    }
}
