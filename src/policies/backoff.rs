//! # Exponential backoff between job attempts.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, clamped to
//! `max`, then jittered. The base is derived from `n` alone, so jitter output
//! never feeds into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use worklane::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(400));
//! assert_eq!(backoff.delay(8), Duration::from_secs(1));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Growth of retry delays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Multiplicative growth per attempt (`1.0` = constant).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 1s`, `factor = 2.0`, `max = 60s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay of `every`.
    pub fn constant(every: Duration) -> Self {
        Self {
            first: every,
            max: every,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .decorrelated(self.first.min(self.max), base, self.max)
            }
            other => other.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(first_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn doubles_until_capped() {
        let p = exp(50, 300);
        let got: Vec<_> = (0..5).map(|a| p.delay(a).as_millis()).collect();
        assert_eq!(got, vec![50, 100, 200, 300, 300]);
    }

    #[test]
    fn constant_never_moves() {
        let p = BackoffPolicy::constant(Duration::from_millis(250));
        assert!((0..20).all(|a| p.delay(a) == Duration::from_millis(250)));
    }

    #[test]
    fn first_above_max_is_clamped() {
        assert_eq!(exp(5_000, 1_000).delay(0), Duration::from_millis(1_000));
    }

    #[test]
    fn overflowing_exponent_clamps() {
        assert_eq!(exp(100, 10_000).delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn full_jitter_stays_under_base() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..exp(100, 60_000)
        };
        for attempt in 0..10 {
            let base = Duration::from_millis(100 * 2u64.pow(attempt));
            assert!(p.delay(attempt) <= base);
        }
    }

    #[test]
    fn decorrelated_has_a_floor() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Decorrelated,
            ..exp(100, 30_000)
        };
        for _ in 0..50 {
            assert!(p.delay(6) >= Duration::from_millis(100));
        }
    }
}
