//! # Listener registry.
//!
//! Name → ordered listener list, stored copy-on-write:
//!
//! ```text
//! RwLock<HashMap<name, Arc<Vec<Registered>>>>
//!   listen / unlisten : write lock, clone the Vec, swap in a new Arc
//!   snapshot          : read lock, clone the Arc (O(1)), release
//! ```
//!
//! ## Rules
//! - Registration order is invocation order.
//! - A dispatch iterates its snapshot; concurrent (un)registration never
//!   affects an in-flight dispatch.
//! - Registration ids are unique for the registry's lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::listener::ListenerRef;

/// Receipt returned by [`EventBus::listen`](super::EventBus::listen).
///
/// Pass it to [`EventBus::unlisten`](super::EventBus::unlisten) to remove
/// exactly this registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    event: String,
    id: u64,
}

impl ListenerHandle {
    /// Event name the listener was registered under.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Registration id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub(crate) struct Registered<T> {
    pub id: u64,
    pub listener: ListenerRef<T>,
}

impl<T> Clone for Registered<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
        }
    }
}

pub(crate) type Snapshot<T> = Arc<Vec<Registered<T>>>;

pub(crate) struct ListenerRegistry<T> {
    map: RwLock<HashMap<String, Snapshot<T>>>,
    next_id: AtomicU64,
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, name: &str, listener: ListenerRef<T>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut map = self.map.write();
        let slot = map.entry(name.to_string()).or_default();
        let mut next = Vec::with_capacity(slot.len() + 1);
        next.extend(slot.iter().cloned());
        next.push(Registered { id, listener });
        *slot = Arc::new(next);
        ListenerHandle {
            event: name.to_string(),
            id,
        }
    }

    /// Removes the first registration matching `pred`. Returns `true` if one was removed.
    fn remove_where(&self, name: &str, pred: impl Fn(&Registered<T>) -> bool) -> bool {
        let mut map = self.map.write();
        let Some(slot) = map.get_mut(name) else {
            return false;
        };
        let Some(pos) = slot.iter().position(&pred) else {
            return false;
        };
        if slot.len() == 1 {
            map.remove(name);
        } else {
            let mut next = Vec::clone(slot);
            next.remove(pos);
            *slot = Arc::new(next);
        }
        true
    }

    pub fn remove_handle(&self, handle: &ListenerHandle) -> bool {
        self.remove_where(&handle.event, |r| r.id == handle.id)
    }

    /// Removes by `Arc` identity (data pointer, ignoring vtables).
    pub fn remove_listener(&self, name: &str, listener: &ListenerRef<T>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        self.remove_where(name, |r| Arc::as_ptr(&r.listener) as *const () == target)
    }

    pub fn snapshot(&self, name: &str) -> Option<Snapshot<T>> {
        self.map.read().get(name).cloned()
    }

    pub fn count(&self, name: &str) -> usize {
        self.map.read().get(name).map_or(0, |v| v.len())
    }

    pub fn names(&self) -> Vec<String> {
        self.map.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::listener::ListenerFn;
    use crate::{Context, Event, TaskError};

    fn noop(name: &'static str) -> ListenerRef<u8> {
        ListenerFn::arc(name, |_ctx: Context, _ev: Arc<Event<u8>>| async {
            Ok::<_, TaskError>(())
        })
    }

    #[test]
    fn handles_remove_exactly_one_registration() {
        let reg = ListenerRegistry::new();
        let l = noop("twice");
        let h1 = reg.add("a", Arc::clone(&l));
        let h2 = reg.add("a", Arc::clone(&l));
        assert_ne!(h1, h2);
        assert_eq!(reg.count("a"), 2);

        assert!(reg.remove_handle(&h1));
        assert!(!reg.remove_handle(&h1));
        let snap = reg.snapshot("a").unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id, h2.id());
    }

    #[test]
    fn snapshot_survives_removal() {
        let reg = ListenerRegistry::new();
        let l = noop("x");
        reg.add("a", Arc::clone(&l));
        let snap = reg.snapshot("a").unwrap();
        assert!(reg.remove_listener("a", &l));
        assert_eq!(snap.len(), 1);
        assert_eq!(reg.count("a"), 0);
        assert!(reg.names().is_empty());
    }

    #[test]
    fn identity_removal_ignores_lookalikes() {
        let reg = ListenerRegistry::new();
        reg.add("a", noop("same"));
        assert!(!reg.remove_listener("a", &noop("same")));
        assert!(!reg.remove_listener("missing", &noop("same")));
        assert_eq!(reg.count("a"), 1);
    }
}
