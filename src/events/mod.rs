//! Typed in-process events.
//!
//! ## Contents
//! - [`EventBus`] registry, synchronous and pool-backed asynchronous dispatch
//! - [`Event`] named, timestamped payload
//! - [`Listener`] / [`ListenerFn`] callbacks; [`ListenerHandle`] removal receipts
//! - [`EventStore`] persistence contract; [`MemoryEventStore`] in-process backend
//! - [`EventConfig`] / [`EventOverride`] options

mod bus;
mod config;
mod event;
mod listener;
mod registry;
mod store;

pub use bus::EventBus;
pub use config::{EventConfig, EventOverride};
pub use event::Event;
pub use listener::{Listener, ListenerFn, ListenerRef};
pub use registry::ListenerHandle;
pub use store::{EventStore, MemoryEventStore};
