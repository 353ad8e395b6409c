//! # Context manager options.
//!
//! Deserialized from the `[context]` table.
//!
//! ## Sentinel values
//! - `default_timeout_sec = 0` → no default deadline
//! - `max_timeout_sec = 0` → requested timeouts are not capped

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Policy applied by [`ContextManager`](super::ContextManager) when deriving contexts.
///
/// ## Field semantics
/// - `enable_deadline`: when `false`, derived contexts carry no deadline at all
/// - `enable_cancellation`: when `false`, derived contexts do not follow parent cancellation
/// - `propagate_values`: when `false`, derived contexts do not see parent values
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Deadline applied by scopes that do not request one (seconds).
    pub default_timeout_sec: u64,
    /// Upper bound on any requested timeout (seconds).
    pub max_timeout_sec: u64,
    /// Apply deadlines to derived contexts.
    pub enable_deadline: bool,
    /// Propagate parent cancellation to derived contexts.
    pub enable_cancellation: bool,
    /// Let derived contexts read parent values.
    pub propagate_values: bool,
}

impl ContextConfig {
    /// Default deadline as an `Option` (`None` = no deadline).
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        match self.default_timeout_sec {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }

    /// Timeout cap as an `Option` (`None` = uncapped).
    #[inline]
    pub fn max_timeout(&self) -> Option<Duration> {
        match self.max_timeout_sec {
            0 => None,
            s => Some(Duration::from_secs(s)),
        }
    }

    /// Clamps `requested` to the configured maximum.
    #[inline]
    pub fn cap(&self, requested: Duration) -> Duration {
        match self.max_timeout() {
            Some(max) => requested.min(max),
            None => requested,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_timeout_sec != 0 && self.max_timeout_sec < self.default_timeout_sec {
            return Err(ConfigError::invalid(
                "context.max_timeout_sec",
                format!(
                    "{} is below default_timeout_sec {}",
                    self.max_timeout_sec, self.default_timeout_sec
                ),
            ));
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    /// - `default_timeout_sec = 30`
    /// - `max_timeout_sec = 300`
    /// - every switch enabled
    fn default() -> Self {
        Self {
            default_timeout_sec: 30,
            max_timeout_sec: 300,
            enable_deadline: true,
            enable_cancellation: true,
            propagate_values: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_respects_sentinel() {
        let mut cfg = ContextConfig::default();
        assert_eq!(cfg.cap(Duration::from_secs(900)), Duration::from_secs(300));
        cfg.max_timeout_sec = 0;
        assert_eq!(cfg.cap(Duration::from_secs(900)), Duration::from_secs(900));
    }

    #[test]
    fn max_below_default_is_rejected() {
        let cfg = ContextConfig {
            default_timeout_sec: 60,
            max_timeout_sec: 10,
            ..ContextConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
