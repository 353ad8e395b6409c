//! Shared lock-light building blocks.
//!
//! ## Contents
//! - [`AtomicCounter`], [`IdGenerator`] lock-free counters for metrics and ids
//! - [`BoundedDeque`] fixed-capacity ring deque (owner LIFO, thief FIFO)
//! - [`ObjectPool`] bounded non-blocking store of reusable values

mod counter;
mod object_pool;
mod ring;

pub use counter::{AtomicCounter, IdGenerator};
pub use object_pool::ObjectPool;
pub use ring::BoundedDeque;
