//! # Job queue options.
//!
//! Deserialized from the `[queue]` table. Per-job overrides live under
//! `[queue.jobs.<name>]`.
//!
//! ## Sentinel values
//! - `capacity = 0` → unbounded queue
//! - `failed_capacity = 0` → unbounded failed set
//! - `timeout_sec = 0` → no handler deadline

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, JitterPolicy, RetryPolicy};

/// Where dispatched jobs go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Every job runs on the caller, queue marker or not.
    Sync,
    /// Queueable jobs go to the in-process [`MemoryQueue`](super::MemoryQueue).
    #[default]
    Memory,
}

/// Retry timing mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryMode {
    /// Re-queue at once.
    Immediate,
    /// Wait an exponential backoff first.
    #[default]
    Backoff,
}

/// Per-job-name overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOverride {
    /// Attempts before the job is moved to the failed set.
    pub max_attempts: Option<u32>,
    /// First retry delay (milliseconds).
    pub retry_delay_ms: Option<u64>,
    /// Handler deadline in seconds (`0` = none).
    pub timeout_sec: Option<u64>,
}

/// Queue, worker and retry knobs.
///
/// ## Field semantics
/// - `workers`: jobs in flight at once
/// - `max_attempts`: total attempts including the first
/// - `retry_*`: backoff shape when `retry_policy = "backoff"`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub driver: Driver,
    /// Pending-job bound (`0` = unbounded).
    pub capacity: usize,
    /// Failed-set bound; the oldest entry is evicted past it (`0` = unbounded).
    pub failed_capacity: usize,
    pub workers: usize,
    pub max_attempts: u32,
    pub retry_policy: RetryMode,
    pub retry_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_factor: f64,
    pub retry_jitter: JitterPolicy,
    /// Default handler deadline in seconds (`0` = none).
    pub timeout_sec: u64,
    /// Overrides keyed by job name.
    pub jobs: HashMap<String, JobOverride>,
}

impl Default for QueueConfig {
    /// - memory driver, unbounded, failed set keeps 1000
    /// - 4 workers, 3 attempts, backoff 1s ×2 up to 60s
    /// - 60s handler deadline
    fn default() -> Self {
        Self {
            driver: Driver::Memory,
            capacity: 0,
            failed_capacity: 1000,
            workers: 4,
            max_attempts: 3,
            retry_policy: RetryMode::Backoff,
            retry_delay_ms: 1000,
            retry_max_delay_ms: 60_000,
            retry_factor: 2.0,
            retry_jitter: JitterPolicy::None,
            timeout_sec: 60,
            jobs: HashMap::new(),
        }
    }
}

impl QueueConfig {
    fn job(&self, name: &str) -> Option<&JobOverride> {
        self.jobs.get(name)
    }

    /// Attempt budget for jobs named `name`.
    pub fn max_attempts_for(&self, name: &str) -> u32 {
        self.job(name)
            .and_then(|o| o.max_attempts)
            .unwrap_or(self.max_attempts)
    }

    /// Handler deadline for jobs named `name`, if any.
    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        let secs = self
            .job(name)
            .and_then(|o| o.timeout_sec)
            .unwrap_or(self.timeout_sec);
        (secs > 0).then(|| Duration::from_secs(secs))
    }

    /// Retry policy for jobs named `name`.
    pub fn retry_policy_for(&self, name: &str) -> RetryPolicy {
        match self.retry_policy {
            RetryMode::Immediate => RetryPolicy::Immediate,
            RetryMode::Backoff => {
                let first = self
                    .job(name)
                    .and_then(|o| o.retry_delay_ms)
                    .unwrap_or(self.retry_delay_ms);
                RetryPolicy::Backoff(BackoffPolicy {
                    first: Duration::from_millis(first),
                    max: Duration::from_millis(self.retry_max_delay_ms.max(first)),
                    factor: self.retry_factor,
                    jitter: self.retry_jitter,
                })
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("queue.workers", "must be at least 1"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("queue.max_attempts", "must be at least 1"));
        }
        if !self.retry_factor.is_finite() || self.retry_factor < 1.0 {
            return Err(ConfigError::invalid(
                "queue.retry_factor",
                format!("{} is not a finite factor >= 1.0", self.retry_factor),
            ));
        }
        if let Some((name, _)) = self.jobs.iter().find(|(_, o)| o.max_attempts == Some(0)) {
            return Err(ConfigError::invalid(
                "queue.jobs.max_attempts",
                format!("job `{name}` must allow at least 1 attempt"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_defaults() {
        let mut cfg = QueueConfig::default();
        cfg.jobs.insert(
            "report".into(),
            JobOverride {
                max_attempts: Some(5),
                retry_delay_ms: Some(10),
                timeout_sec: Some(0),
            },
        );

        assert_eq!(cfg.max_attempts_for("report"), 5);
        assert_eq!(cfg.max_attempts_for("email"), 3);
        assert_eq!(cfg.timeout_for("report"), None);
        assert_eq!(cfg.timeout_for("email"), Some(Duration::from_secs(60)));
        assert_eq!(
            cfg.retry_policy_for("report").delay(0),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            cfg.retry_policy_for("email").delay(1),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn immediate_mode_ignores_delays() {
        let cfg = QueueConfig {
            retry_policy: RetryMode::Immediate,
            ..QueueConfig::default()
        };
        assert_eq!(cfg.retry_policy_for("any").delay(4), None);
    }

    #[test]
    fn rejects_zero_workers_and_attempts() {
        let cfg = QueueConfig {
            workers: 0,
            ..QueueConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = QueueConfig {
            max_attempts: 0,
            ..QueueConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(QueueConfig::default().validate().is_ok());
    }
}
