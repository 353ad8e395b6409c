//! # Typed events.
//!
//! ## Example
//! ```rust
//! use worklane::Event;
//!
//! let ev = Event::new("user.created", "alice").with_id("e1").with_source("signup");
//! assert_eq!(ev.id, "e1");
//! assert_eq!(ev.name, "user.created");
//! assert_eq!(ev.source.as_deref(), Some("signup"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::primitives::IdGenerator;

static EVENT_IDS: IdGenerator = IdGenerator::new("evt");

/// Named, timestamped payload dispatched through an [`EventBus`](super::EventBus).
///
/// Listeners receive it behind an `Arc`, so every listener of one dispatch
/// sees the same immutable value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    /// Unique id (`evt-N` unless supplied).
    pub id: String,
    /// Routing key.
    pub name: String,
    /// User data.
    pub payload: T,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Optional producer tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl<T> Event<T> {
    /// Creates an event stamped now with a generated id.
    pub fn new(name: impl Into<String>, payload: T) -> Self {
        Self {
            id: EVENT_IDS.next_id(),
            name: name.into(),
            payload,
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Replaces the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the producer tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Overrides the timestamp.
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = Event::new("x", ());
        let b = Event::new("x", ());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("evt-"));
    }

    #[test]
    fn serializes_without_empty_source() {
        let ev = Event::new("user.created", 7u32).with_id("e1");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["id"], "e1");
        assert_eq!(json["payload"], 7);
        assert!(json.get("source").is_none());

        let back: Event<u32> = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
