//! # Task pool options.
//!
//! Deserialized from the `[pool]` table.
//!
//! ## Sentinel values
//! - `num_workers = 0` → one worker per available CPU
//! - `min_workers = 0` → same as the resolved worker count
//! - `max_workers = 0` → same as the resolved worker count

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Sizing, stealing and scaling knobs for [`TaskPool`](super::TaskPool).
///
/// ## Field semantics
/// - `queue_size`: overflow queue bound shared by all workers
/// - `deque_capacity`: bound of each worker's local deque
/// - `steal_threshold`: victims holding fewer items are skipped
/// - `steal_batch_size`: most items taken in one steal
/// - `idle_timeout_ms`: sleep after a rotation that found no work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Initial worker count.
    pub num_workers: usize,
    /// Overflow queue capacity.
    pub queue_size: usize,
    /// Local deque capacity per worker.
    pub deque_capacity: usize,
    /// Minimum victim deque length worth stealing from.
    pub steal_threshold: usize,
    /// Maximum items moved per steal.
    pub steal_batch_size: usize,
    /// Idle sleep between empty rotations (milliseconds).
    pub idle_timeout_ms: u64,
    /// Lower bound for the scaling controller.
    pub min_workers: usize,
    /// Upper bound for the scaling controller.
    pub max_workers: usize,
    /// Run the scaling controller.
    pub enable_auto_scaling: bool,
    /// Scaling decision cadence (milliseconds).
    pub scale_interval_ms: u64,
    /// Idle rotations every worker must reach before one is retired.
    pub scale_down_idle_rotations: u64,
}

impl PoolConfig {
    /// Resolved initial worker count (never zero).
    pub fn workers(&self) -> usize {
        match self.num_workers {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }

    /// Resolved lower scaling bound.
    pub fn min(&self) -> usize {
        match self.min_workers {
            0 => self.workers(),
            n => n,
        }
    }

    /// Resolved upper scaling bound.
    pub fn max(&self) -> usize {
        match self.max_workers {
            0 => self.workers(),
            n => n,
        }
    }

    /// Idle sleep as a `Duration`.
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Scaling cadence as a `Duration` (min 10ms).
    #[inline]
    pub fn scale_interval(&self) -> Duration {
        Duration::from_millis(self.scale_interval_ms.max(10))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.deque_capacity == 0 {
            return Err(ConfigError::invalid("pool.deque_capacity", "must be at least 1"));
        }
        if self.queue_size == 0 {
            return Err(ConfigError::invalid("pool.queue_size", "must be at least 1"));
        }
        if self.steal_batch_size == 0 {
            return Err(ConfigError::invalid("pool.steal_batch_size", "must be at least 1"));
        }
        if self.min() > self.max() {
            return Err(ConfigError::invalid(
                "pool.min_workers",
                format!("{} exceeds max_workers {}", self.min(), self.max()),
            ));
        }
        let n = self.workers();
        if n < self.min() || n > self.max() {
            return Err(ConfigError::invalid(
                "pool.num_workers",
                format!("{n} outside [{}, {}]", self.min(), self.max()),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// - `num_workers = 0` (CPU count), `queue_size = 1024`, `deque_capacity = 256`
    /// - `steal_threshold = 2`, `steal_batch_size = 10`, `idle_timeout_ms = 100`
    /// - scaling off, cadence 1s, scale down after 10 idle rotations
    fn default() -> Self {
        Self {
            num_workers: 0,
            queue_size: 1024,
            deque_capacity: 256,
            steal_threshold: 2,
            steal_batch_size: 10,
            idle_timeout_ms: 100,
            min_workers: 0,
            max_workers: 0,
            enable_auto_scaling: false,
            scale_interval_ms: 1000,
            scale_down_idle_rotations: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_resolve_to_worker_count() {
        let cfg = PoolConfig {
            num_workers: 3,
            ..PoolConfig::default()
        };
        assert_eq!((cfg.workers(), cfg.min(), cfg.max()), (3, 3, 3));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let cfg = PoolConfig {
            num_workers: 2,
            min_workers: 4,
            max_workers: 2,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_batch_is_rejected() {
        let cfg = PoolConfig {
            num_workers: 1,
            steal_batch_size: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
