//! # Event persistence.
//!
//! [`EventStore`] is the contract for durable backends; [`MemoryEventStore`]
//! is the process-local implementation (optionally bounded, oldest evicted).

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::event::Event;
use crate::error::StoreError;

/// Storage backend for dispatched events.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait EventStore<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    /// Persists one event.
    async fn store(&self, event: &Event<T>) -> Result<(), StoreError>;

    /// Persists several events; stops at the first failure.
    async fn store_many(&self, events: &[Event<T>]) -> Result<(), StoreError> {
        for event in events {
            self.store(event).await?;
        }
        Ok(())
    }

    /// Event with the given id.
    async fn get(&self, id: &str) -> Result<Option<Event<T>>, StoreError>;

    /// Events named `name`, oldest first, at most `limit` (`None` = all).
    async fn get_by_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<Event<T>>, StoreError>;

    /// Events with `start <= timestamp <= end`, oldest first.
    async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event<T>>, StoreError>;

    /// Deletes by id. Returns `true` if an event was removed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Number of stored events.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Number of stored events named `name`.
    async fn count_by_name(&self, name: &str) -> Result<usize, StoreError>;

    /// Removes every event.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-memory [`EventStore`].
///
/// # Example
/// ```
/// use worklane::{Event, EventStore, MemoryEventStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = MemoryEventStore::with_capacity(2);
/// for n in 0..3u8 {
///     store.store(&Event::new("tick", n)).await.unwrap();
/// }
/// assert_eq!(store.count().await.unwrap(), 2);
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryEventStore<T> {
    events: Mutex<VecDeque<Event<T>>>,
    capacity: usize,
}

impl<T> MemoryEventStore<T> {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Store keeping at most `capacity` events (`0` = unbounded).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    fn collect(&self, pred: impl Fn(&Event<T>) -> bool, limit: Option<usize>) -> Vec<Event<T>>
    where
        T: Clone,
    {
        self.events
            .lock()
            .iter()
            .filter(|e| pred(e))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

impl<T> Default for MemoryEventStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> EventStore<T> for MemoryEventStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn store(&self, event: &Event<T>) -> Result<(), StoreError> {
        let mut events = self.events.lock();
        if self.capacity > 0 && events.len() >= self.capacity {
            if let Some(evicted) = events.pop_front() {
                tracing::debug!(event = %evicted.id, "event store full; evicted oldest");
            }
        }
        events.push_back(event.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Event<T>>, StoreError> {
        Ok(self.events.lock().iter().find(|e| e.id == id).cloned())
    }

    async fn get_by_name(&self, name: &str, limit: Option<usize>) -> Result<Vec<Event<T>>, StoreError> {
        Ok(self.collect(|e| e.name == name, limit))
    }

    async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event<T>>, StoreError> {
        Ok(self.collect(|e| e.timestamp >= start && e.timestamp <= end, None))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut events = self.events.lock();
        match events.iter().position(|e| e.id == id) {
            Some(pos) => {
                events.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.events.lock().len())
    }

    async fn count_by_name(&self, name: &str) -> Result<usize, StoreError> {
        Ok(self.events.lock().iter().filter(|e| e.name == name).count())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.events.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn store_many_then_query_by_name() {
        let store = MemoryEventStore::new();
        store.store(&Event::new("other", 0u8)).await.unwrap();
        let batch = vec![
            Event::new("user.created", 1u8),
            Event::new("user.deleted", 2u8),
            Event::new("user.created", 3u8),
        ];
        store.store_many(&batch).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 4);
        let created = store.get_by_name("user.created", None).await.unwrap();
        let payloads: Vec<u8> = created.iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec![1, 3]);
        assert_eq!(store.get_by_name("user.created", Some(1)).await.unwrap().len(), 1);
        assert_eq!(store.count_by_name("user.deleted").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn time_range_is_inclusive() {
        let t0 = Utc::now();
        let store = MemoryEventStore::new();
        for (i, offset) in [0i64, 10, 20].into_iter().enumerate() {
            let ev = Event::new("tick", i)
                .with_id(format!("t{i}"))
                .with_timestamp(t0 + ChronoDuration::seconds(offset));
            store.store(&ev).await.unwrap();
        }
        let hits = store
            .get_by_time_range(t0 + ChronoDuration::seconds(10), t0 + ChronoDuration::seconds(20))
            .await
            .unwrap();
        let ids: Vec<_> = hits.into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[tokio::test]
    async fn get_delete_clear() {
        let store = MemoryEventStore::new();
        store.store(&Event::new("a", ()).with_id("e1")).await.unwrap();
        assert!(store.get("e1").await.unwrap().is_some());
        assert!(store.delete("e1").await.unwrap());
        assert!(!store.delete("e1").await.unwrap());
        store.store(&Event::new("a", ())).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
