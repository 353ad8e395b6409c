//! Error types used by the worklane runtime and its handlers.
//!
//! Each subsystem has its own enum:
//!
//! - [`ContextError`]: a context fired (deadline or cancellation).
//! - [`TaskError`]: raised by user handlers (work items, listeners, jobs).
//! - [`PoolError`]: task pool admission failures.
//! - [`EventError`] / [`StoreError`]: event bus and event store failures.
//! - [`QueueError`] / [`JobError`]: job queue and dispatcher failures.
//! - [`ConfigError`]: configuration loading and validation.
//! - [`RuntimeError`]: shutdown of the composed runtime.
//!
//! All enums provide `as_label` (stable snake_case label for logs/metrics).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// # Reason a context stopped.
///
/// Once a context reports an error it keeps reporting the same one.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The context (or one of its ancestors) was cancelled or released.
    #[error("context cancelled")]
    Cancelled,
}

impl ContextError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use worklane::ContextError;
    ///
    /// assert_eq!(ContextError::DeadlineExceeded.as_label(), "deadline_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ContextError::DeadlineExceeded => "deadline_exceeded",
            ContextError::Cancelled => "cancelled",
        }
    }
}

/// # Errors produced by handler execution.
///
/// Returned by work item handlers, event listeners and job handlers.
/// Some errors are retryable (`Fail`, `DeadlineExceeded`, `Panicked`), others are final.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Handler failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error (never retried).
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// The handler's context deadline fired before it completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The handler's context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The handler panicked; the panic was caught and isolated.
    #[error("handler panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl fmt::Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Shorthand for [`TaskError::Fatal`].
    pub fn fatal(error: impl fmt::Display) -> Self {
        TaskError::Fatal {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use worklane::TaskError;
    ///
    /// assert_eq!(TaskError::fail("boom").as_label(), "task_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::DeadlineExceeded => "task_deadline_exceeded",
            TaskError::Cancelled => "task_cancelled",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// # Example
    /// ```
    /// use worklane::TaskError;
    ///
    /// assert!(TaskError::fail("boom").is_retryable());
    /// assert!(!TaskError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Fail { .. } | TaskError::DeadlineExceeded | TaskError::Panicked { .. }
        )
    }

    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let info = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TaskError::Panicked { info }
    }
}

impl From<ContextError> for TaskError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::DeadlineExceeded => TaskError::DeadlineExceeded,
            ContextError::Cancelled => TaskError::Cancelled,
        }
    }
}

/// # Task pool admission errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Target deque and overflow queue are both full.
    #[error("pool saturated: overflow queue at capacity {capacity}")]
    Saturated {
        /// Overflow queue bound.
        capacity: usize,
    },

    /// The pool is shutting down and no longer accepts work.
    #[error("pool closed")]
    Closed,

    /// An internal invariant broke; acceptance is halted.
    #[error("pool halted: {reason}")]
    Fatal {
        /// Description of the broken invariant.
        reason: String,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::Saturated { .. } => "pool_saturated",
            PoolError::Closed => "pool_closed",
            PoolError::Fatal { .. } => "pool_fatal",
        }
    }
}

/// # Event store backend failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store rejected the operation.
    #[error("event store failure: {reason}")]
    Backend {
        /// Backend-specific description.
        reason: String,
    },
}

impl StoreError {
    /// Shorthand for [`StoreError::Backend`].
    pub fn backend(reason: impl fmt::Display) -> Self {
        StoreError::Backend {
            reason: reason.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Backend { .. } => "store_backend",
        }
    }
}

/// One listener failure recorded during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Listener name.
    pub listener: String,
    /// Error the listener produced.
    pub error: TaskError,
}

/// Aggregate of every listener failure for one dispatched event.
///
/// Listeners are never short-circuited, so this may hold several entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailures {
    /// Name of the dispatched event.
    pub event: String,
    /// Failures in listener registration order.
    pub failures: Vec<ListenerFailure>,
}

impl fmt::Display for ListenerFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} listener(s) failed for '{}'",
            self.failures.len(),
            self.event
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.listener, failure.error)?;
        }
        Ok(())
    }
}

/// # Event bus errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Caller passed an unusable argument (empty event or listener name).
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },

    /// Persisting the event failed; listeners were not invoked.
    #[error("store failed: {0}")]
    StoreFailed(#[source] StoreError),

    /// One or more listeners returned an error.
    #[error("{0}")]
    ListenersFailed(ListenerFailures),

    /// Asynchronous dispatch could not be scheduled.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl EventError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        EventError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventError::InvalidArgument { .. } => "event_invalid_argument",
            EventError::StoreFailed(_) => "event_store_failed",
            EventError::ListenersFailed(_) => "event_listeners_failed",
            EventError::Pool(_) => "event_pool_rejected",
        }
    }
}

/// # Job queue errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Bounded queue is at capacity.
    #[error("queue full (capacity {capacity})")]
    QueueFull {
        /// Queue bound.
        capacity: usize,
    },

    /// No job with the given id.
    #[error("job not found: {id}")]
    NotFound {
        /// Requested job id.
        id: String,
    },

    /// Caller passed an unusable argument.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },

    /// The supplied context fired before the operation completed.
    #[error("queue operation interrupted: {0}")]
    Context(#[from] ContextError),

    /// The queue driver failed (persistent backends).
    #[error("queue driver failure: {reason}")]
    Driver {
        /// Driver-specific description.
        reason: String,
    },

    /// The queue has been closed.
    #[error("queue closed")]
    Closed,
}

impl QueueError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::QueueFull { .. } => "queue_full",
            QueueError::NotFound { .. } => "queue_not_found",
            QueueError::InvalidArgument { .. } => "queue_invalid_argument",
            QueueError::Context(ContextError::Cancelled) => "queue_cancelled",
            QueueError::Context(ContextError::DeadlineExceeded) => "queue_deadline_exceeded",
            QueueError::Driver { .. } => "queue_driver_failed",
            QueueError::Closed => "queue_closed",
        }
    }
}

/// # Dispatcher errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Pushing to the configured queue failed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Synchronous execution returned an error.
    #[error(transparent)]
    Handler(#[from] TaskError),
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Queue(e) => e.as_label(),
            JobError::Handler(e) => e.as_label(),
        }
    }
}

/// # Configuration errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid TOML or does not match the schema.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent with another.
    #[error("invalid config `{field}`: {reason}")]
    Invalid {
        /// Dot-path of the offending field.
        field: &'static str,
        /// Why it is invalid.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by the composed runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck workers: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of the workers that did not finish in time.
        stuck: Vec<usize>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use worklane::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
