//! # Adaptive worker scaling.
//!
//! The [`Scaler`] samples pool signals several times per cadence and makes one
//! decision per cadence:
//!
//! ```text
//! every scale_interval / SAMPLES:  overflow_len, mean idle streak, min idle streak
//! every scale_interval:
//!   all workers idle ≥ scale_down_idle_rotations in every sample  → retire one (≥ min)
//!   mean overflow > queue_size / 2  OR  mean idle streak < 1       → add one   (≤ max)
//!   otherwise                                                      → hold
//! ```
//!
//! Retired workers drain their own deque before exiting, so scaling never
//! drops an accepted item.

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};

use super::config::PoolConfig;
use super::core::Shared;

const SAMPLES: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decision {
    Grow,
    Shrink,
    Hold,
}

/// Signals aggregated over one cadence.
#[derive(Debug, Default)]
pub(crate) struct Window {
    samples: u32,
    overflow_sum: u64,
    idle_sum: f64,
    all_idle: bool,
}

impl Window {
    fn fresh() -> Self {
        Self {
            all_idle: true,
            ..Self::default()
        }
    }

    /// Adds one observation: overflow length and every worker's idle streak.
    pub(crate) fn observe(&mut self, overflow_len: usize, idle_streaks: &[u64], threshold: u64) {
        self.samples += 1;
        self.overflow_sum += overflow_len as u64;
        if idle_streaks.is_empty() {
            self.all_idle = false;
            return;
        }
        let mean = idle_streaks.iter().sum::<u64>() as f64 / idle_streaks.len() as f64;
        self.idle_sum += mean;
        self.all_idle &= idle_streaks.iter().all(|s| *s >= threshold.max(1));
    }

    pub(crate) fn decide(&self, workers: usize, cfg: &PoolConfig) -> Decision {
        if self.samples == 0 {
            return Decision::Hold;
        }
        let n = f64::from(self.samples);
        let mean_overflow = self.overflow_sum as f64 / n;
        let mean_idle = self.idle_sum / n;

        if self.all_idle && workers > cfg.min() {
            Decision::Shrink
        } else if (mean_overflow > cfg.queue_size as f64 / 2.0 || mean_idle < 1.0)
            && workers < cfg.max()
        {
            Decision::Grow
        } else {
            Decision::Hold
        }
    }
}

pub(crate) struct Scaler {
    shared: Arc<Shared>,
}

impl Scaler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) async fn run(self) {
        let cfg = &self.shared.cfg;
        let mut tick = time::interval(cfg.scale_interval() / SAMPLES);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut window = Window::fresh();

        loop {
            tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }

            let streaks: Vec<u64> = self
                .shared
                .roster
                .read()
                .iter()
                .map(|s| s.stats.idle_streak())
                .collect();
            window.observe(
                self.shared.overflow_len(),
                &streaks,
                cfg.scale_down_idle_rotations,
            );
            if window.samples < SAMPLES {
                continue;
            }

            let workers = streaks.len();
            match window.decide(workers, cfg) {
                Decision::Grow => {
                    if let Some(id) = self.shared.spawn_worker() {
                        tracing::info!(worker = id, workers = workers + 1, "scaled up");
                    }
                }
                Decision::Shrink => {
                    if let Some(id) = self.shared.retire_worker(cfg.min()) {
                        tracing::info!(worker = id, workers = workers - 1, "scaled down");
                    }
                }
                Decision::Hold => {}
            }
            window = Window::fresh();
        }
        tracing::debug!("scaler stopped");
    }
}
