//! # Fixed-capacity ring deque.
//!
//! [`BoundedDeque`] is the storage behind each worker's local deque and the
//! pool's overflow queue.
//!
//! ```text
//!            thief end                          owner end
//!   pop_front / steal_front ◄── [ a b c d e ] ◄── push_back
//!                                           └──► pop_back
//! ```
//!
//! ## Rules
//! - The owner pushes and pops at the back (LIFO for the owner).
//! - Thieves remove from the front (FIFO: oldest item first).
//! - Pushing into a full deque hands the item back instead of growing.
//!
//! The deque itself is not synchronized; callers wrap it in a mutex.

/// Ring buffer with a hard capacity.
///
/// # Example
/// ```
/// use worklane::primitives::BoundedDeque;
///
/// let mut dq = BoundedDeque::new(2);
/// assert!(dq.push_back(1).is_ok());
/// assert!(dq.push_back(2).is_ok());
/// assert_eq!(dq.push_back(3), Err(3));
/// assert_eq!(dq.pop_back(), Some(2));
/// assert_eq!(dq.pop_front(), Some(1));
/// ```
#[derive(Debug)]
pub struct BoundedDeque<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> BoundedDeque<T> {
    /// Creates an empty deque. A capacity of `0` is clamped to `1`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>();
        Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    #[inline]
    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % self.slots.len()
    }

    /// Maximum number of items.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of resident items.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no items are resident.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when another push would be rejected.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    /// Appends at the owner end. Returns the item back if the deque is full.
    pub fn push_back(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        let idx = self.slot(self.len);
        self.slots[idx] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Removes the newest item (owner end).
    pub fn pop_back(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        let idx = self.slot(self.len);
        self.slots[idx].take()
    }

    /// Removes the oldest item (thief end).
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        item
    }

    /// Moves up to `max` of the oldest items into `out`, oldest first.
    ///
    /// Returns the number of items moved.
    pub fn steal_front(&mut self, max: usize, out: &mut Vec<T>) -> usize {
        let n = max.min(self.len);
        out.reserve(n);
        for _ in 0..n {
            if let Some(item) = self.pop_front() {
                out.push(item);
            }
        }
        n
    }

    /// Removes every item, oldest first.
    pub fn drain_all(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(item) = self.pop_front() {
            out.push(item);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_lifo_thief_is_fifo() {
        let mut dq = BoundedDeque::new(8);
        for i in 0..5 {
            dq.push_back(i).unwrap();
        }
        assert_eq!(dq.pop_back(), Some(4));
        assert_eq!(dq.pop_front(), Some(0));
        assert_eq!(dq.pop_front(), Some(1));
        assert_eq!(dq.pop_back(), Some(3));
        assert_eq!(dq.len(), 1);
    }

    #[test]
    fn wraps_around_the_ring() {
        let mut dq = BoundedDeque::new(3);
        dq.push_back(1).unwrap();
        dq.push_back(2).unwrap();
        assert_eq!(dq.pop_front(), Some(1));
        dq.push_back(3).unwrap();
        dq.push_back(4).unwrap();
        assert!(dq.is_full());
        assert_eq!(dq.push_back(5), Err(5));
        assert_eq!(dq.drain_all(), vec![2, 3, 4]);
        assert!(dq.is_empty());
    }

    #[test]
    fn steal_takes_oldest_up_to_max() {
        let mut dq = BoundedDeque::new(10);
        for i in 0..6 {
            dq.push_back(i).unwrap();
        }
        let mut out = Vec::new();
        assert_eq!(dq.steal_front(4, &mut out), 4);
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert_eq!(dq.steal_front(10, &mut out), 2);
        assert_eq!(dq.len(), 0);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut dq = BoundedDeque::new(0);
        assert_eq!(dq.capacity(), 1);
        assert!(dq.push_back("a").is_ok());
        assert_eq!(dq.push_back("b"), Err("b"));
    }
}
