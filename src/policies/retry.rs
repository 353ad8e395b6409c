//! # When a failed job goes back on the queue.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Re-queue timing for failed jobs, chosen once at configuration time.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use worklane::{BackoffPolicy, RetryPolicy};
///
/// assert_eq!(RetryPolicy::Immediate.delay(3), None);
///
/// let p = RetryPolicy::Backoff(BackoffPolicy::constant(Duration::from_millis(20)));
/// assert_eq!(p.delay(0), Some(Duration::from_millis(20)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Re-queue at once.
    Immediate,
    /// Wait the backoff delay for the attempt, then re-queue.
    Backoff(BackoffPolicy),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Backoff(BackoffPolicy::default())
    }
}

impl RetryPolicy {
    /// Wait before re-queueing after failed attempt number `attempt` (0-indexed).
    ///
    /// `None` means re-queue immediately.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            RetryPolicy::Immediate => None,
            RetryPolicy::Backoff(b) => Some(b.delay(attempt)).filter(|d| !d.is_zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_backoff_is_immediate() {
        let p = RetryPolicy::Backoff(BackoffPolicy::constant(Duration::ZERO));
        assert_eq!(p.delay(0), None);
    }

    #[test]
    fn backoff_grows_per_attempt() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(0), Some(Duration::from_secs(1)));
        assert_eq!(p.delay(1), Some(Duration::from_secs(2)));
    }
}
