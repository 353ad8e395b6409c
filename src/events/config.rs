//! # Event bus options.
//!
//! Deserialized from the `[events]` table; per-name overrides live under
//! `[events.overrides."<event name>"]`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Options for [`EventBus`](super::EventBus).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Maximum asynchronous dispatches running at once.
    pub listener_pool_size: usize,
    /// Attach an in-memory event store when the runtime is built.
    pub event_store_enabled: bool,
    /// Retention bound of the in-memory store (`0` = unbounded).
    pub event_store_capacity: usize,
    /// Per-event-name settings.
    pub overrides: HashMap<String, EventOverride>,
}

/// Settings for one event name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOverride {
    /// Bound on every listener invocation for this name (milliseconds).
    pub timeout_ms: Option<u64>,
    /// Persist events of this name to the store (default `true`).
    pub persist: Option<bool>,
}

impl EventConfig {
    /// Listener timeout for `name`, if one is configured.
    pub fn listener_timeout(&self, name: &str) -> Option<Duration> {
        self.overrides
            .get(name)
            .and_then(|o| o.timeout_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Whether events named `name` go to the store.
    pub fn persists(&self, name: &str) -> bool {
        self.overrides
            .get(name)
            .and_then(|o| o.persist)
            .unwrap_or(true)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.listener_pool_size == 0 {
            return Err(ConfigError::invalid(
                "events.listener_pool_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for EventConfig {
    /// `listener_pool_size = 64`, no store, no overrides.
    fn default() -> Self {
        Self {
            listener_pool_size: 64,
            event_store_enabled: false,
            event_store_capacity: 0,
            overrides: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_per_name() {
        let mut cfg = EventConfig::default();
        cfg.overrides.insert(
            "audit.tick".into(),
            EventOverride {
                timeout_ms: Some(250),
                persist: Some(false),
            },
        );
        assert_eq!(cfg.listener_timeout("audit.tick"), Some(Duration::from_millis(250)));
        assert!(!cfg.persists("audit.tick"));
        assert!(cfg.persists("user.created"));
        assert_eq!(cfg.listener_timeout("user.created"), None);
    }
}
