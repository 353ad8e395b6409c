//! # Lock-free counters.
//!
//! [`AtomicCounter`] backs every metric in the crate. [`IdGenerator`] hands out
//! process-unique, monotonically increasing identifiers such as `evt-17`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic `u64` counter.
///
/// All operations use relaxed ordering: counters are observability data and
/// never synchronize other memory.
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Creates a counter starting at zero.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Adds one and returns the previous value.
    #[inline]
    pub fn incr(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds `n` and returns the previous value.
    #[inline]
    pub fn add(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::Relaxed)
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Resets to zero and returns the value accumulated since the last reset.
    #[inline]
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }

    /// Overwrites the current value.
    #[inline]
    pub fn set(&self, value: u64) {
        self.0.store(value, Ordering::Relaxed);
    }
}

/// Generates `"{prefix}-{n}"` identifiers, unique within one generator.
///
/// # Example
/// ```
/// use worklane::primitives::IdGenerator;
///
/// let ids = IdGenerator::new("job");
/// assert_eq!(ids.next_id(), "job-1");
/// assert_eq!(ids.next_id(), "job-2");
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    prefix: &'static str,
    counter: AtomicCounter,
}

impl IdGenerator {
    /// Creates a generator whose first id is `"{prefix}-1"`.
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicCounter::new(),
        }
    }

    /// Returns the next identifier.
    pub fn next_id(&self) -> String {
        format!("{}-{}", self.prefix, self.counter.incr() + 1)
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn take_resets_the_window() {
        let c = AtomicCounter::new();
        c.incr();
        c.add(4);
        assert_eq!(c.get(), 5);
        assert_eq!(c.take(), 5);
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let ids = Arc::new(IdGenerator::new("t"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id");
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(ids.issued(), 1000);
    }
}
