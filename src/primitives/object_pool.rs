//! # Bounded object pool.
//!
//! [`ObjectPool`] keeps up to `capacity` reusable values in a lock-free
//! [`ArrayQueue`]. Neither side ever blocks:
//! - `get` falls back to the factory when the pool is empty;
//! - `put` discards the value when the pool is full.

use crossbeam_queue::ArrayQueue;

use super::AtomicCounter;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Reusable value store with allocate-on-miss and discard-on-overflow.
///
/// # Example
/// ```
/// use worklane::primitives::ObjectPool;
///
/// let pool = ObjectPool::new(2, || Vec::<u8>::with_capacity(64));
/// let mut buf = pool.get();
/// buf.push(1);
/// buf.clear();
/// assert!(pool.put(buf));
/// assert_eq!(pool.len(), 1);
/// ```
pub struct ObjectPool<T> {
    slots: ArrayQueue<T>,
    factory: Factory<T>,
    hits: AtomicCounter,
    misses: AtomicCounter,
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool holding at most `capacity` values (min 1).
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            slots: ArrayQueue::new(capacity.max(1)),
            factory: Box::new(factory),
            hits: AtomicCounter::new(),
            misses: AtomicCounter::new(),
        }
    }

    /// Takes a pooled value, or builds a fresh one when the pool is empty.
    pub fn get(&self) -> T {
        match self.slots.pop() {
            Some(v) => {
                self.hits.incr();
                v
            }
            None => {
                self.misses.incr();
                (self.factory)()
            }
        }
    }

    /// Returns a value to the pool. Returns `false` if it was discarded.
    pub fn put(&self, value: T) -> bool {
        self.slots.push(value).is_ok()
    }

    /// Number of values currently pooled.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no value is pooled.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(hits, misses)` of `get` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.get(), self.misses.get())
    }
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("len", &self.slots.len())
            .field("capacity", &self.slots.capacity())
            .finish()
    }
}
