//! # Jitter applied to retry delays.
//!
//! - [`JitterPolicy::None`] exact delay
//! - [`JitterPolicy::Full`] random in `[0, delay]`
//! - [`JitterPolicy::Equal`] `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`] random in `[floor, min(prev × 3, max)]`

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Randomization strategy for retry delays.
///
/// Deserialized from lowercase names (`"none"`, `"full"`, `"equal"`, `"decorrelated"`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterPolicy {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Half the delay plus a uniform share of the other half.
    Equal,
    /// Uniform between a floor and three times the previous delay.
    ///
    /// Needs extra input; see [`JitterPolicy::decorrelated`].
    Decorrelated,
}

impl JitterPolicy {
    /// Jitters `delay`. `Decorrelated` returns `delay` unchanged.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = millis(delay);
        if ms == 0 {
            return Duration::ZERO;
        }
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=half)
                };
                Duration::from_millis(half + extra)
            }
        }
    }

    /// Decorrelated jitter over `[floor, min(prev × 3, max)]`.
    ///
    /// Other variants fall back to [`JitterPolicy::apply`] on `prev`.
    pub fn decorrelated(&self, floor: Duration, prev: Duration, max: Duration) -> Duration {
        if *self != JitterPolicy::Decorrelated {
            return self.apply(prev);
        }
        let lo = millis(floor);
        let hi = millis(prev).saturating_mul(3).min(millis(max)).max(lo);
        if lo >= hi {
            return floor;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_stays_zero() {
        for j in [JitterPolicy::Full, JitterPolicy::Equal, JitterPolicy::None] {
            assert_eq!(j.apply(Duration::ZERO), Duration::ZERO);
        }
    }

    #[test]
    fn equal_keeps_at_least_half() {
        for _ in 0..64 {
            let d = JitterPolicy::Equal.apply(Duration::from_millis(200));
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
    }

    #[test]
    fn decorrelated_respects_floor_and_cap() {
        for _ in 0..64 {
            let d = JitterPolicy::Decorrelated.decorrelated(
                Duration::from_millis(50),
                Duration::from_secs(10),
                Duration::from_secs(2),
            );
            assert!(d >= Duration::from_millis(50) && d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn parses_lowercase_names() {
        #[derive(Deserialize)]
        struct Doc {
            jitter: JitterPolicy,
        }
        let doc: Doc = toml::from_str(r#"jitter = "equal""#).unwrap();
        assert_eq!(doc.jitter, JitterPolicy::Equal);
    }
}
