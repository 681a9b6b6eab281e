//! # Tick Clock
//!
//! Fixed-timestep accumulator. Wall time goes in through
//! [`TickClock::accumulate`]; whole ticks come out, and the leftover
//! fraction becomes the render interpolation.
//!
//! ## Adaptive catch-up
//!
//! A frame normally runs up to `max_catch_up_ticks` ticks to make up for a
//! long frame. When the average step time exceeds the tick budget, running
//! more ticks only makes the next frame longer, so the cap drops to one
//! tick per frame until the average is back under budget. Time that cannot
//! be simulated under the cap is discarded rather than carried forward.

use std::time::Duration;

use cadence_core::RunningStats;

use crate::config::LoopConfig;

/// Fixed-timestep clock with an adaptive catch-up cap.
#[derive(Clone, Debug)]
pub struct TickClock {
    budget: Duration,
    accumulator: Duration,
    max_catch_up: u32,
    cap: u32,
    degraded: bool,
}

impl TickClock {
    /// Creates a clock producing `tick_rate_hz` ticks per simulated second.
    /// Both arguments are clamped to at least 1, and the tick budget to at
    /// least one nanosecond.
    #[must_use]
    pub fn new(tick_rate_hz: u32, max_catch_up: u32) -> Self {
        let max_catch_up = max_catch_up.max(1);
        Self {
            budget: (Duration::from_secs(1) / tick_rate_hz.max(1)).max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
            max_catch_up,
            cap: max_catch_up,
            degraded: false,
        }
    }

    /// Creates a clock from loop settings.
    #[must_use]
    pub fn from_config(config: &LoopConfig) -> Self {
        Self::new(config.tick_rate_hz, config.max_catch_up_ticks)
    }

    /// Simulated time per tick.
    #[inline]
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Ticks a single frame may currently run.
    #[inline]
    #[must_use]
    pub const fn catch_up_cap(&self) -> u32 {
        self.cap
    }

    /// Whether the cap has been lowered because steps run over budget.
    #[inline]
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Adds elapsed wall time and returns the number of ticks due now.
    ///
    /// The result never exceeds [`TickClock::catch_up_cap`]. Any backlog
    /// beyond the cap is dropped, keeping only the sub-tick remainder.
    pub fn accumulate(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        let budget = self.budget.as_nanos();
        let due = self.accumulator.as_nanos() / budget;
        let remainder = self.accumulator.as_nanos() % budget;

        if due > u128::from(self.cap) {
            tracing::debug!(
                due = u64::try_from(due).unwrap_or(u64::MAX),
                cap = self.cap,
                "tick backlog dropped"
            );
            self.accumulator = nanos(remainder);
            return self.cap;
        }

        // `due <= cap`, which fits in u32.
        let due = u32::try_from(due).unwrap_or(self.cap);
        self.accumulator = nanos(remainder);
        due
    }

    /// Fraction of a tick accumulated since the last tick, in `[0, 1)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn interpolation(&self) -> f32 {
        let alpha = self.accumulator.as_secs_f64() / self.budget.as_secs_f64();
        (alpha as f32).clamp(0.0, MAX_ALPHA)
    }

    /// Re-evaluates the catch-up cap from recent step times.
    ///
    /// Returns true if the cap changed.
    pub fn adapt(&mut self, step_stats: &RunningStats) -> bool {
        let Some(average) = step_stats.average() else {
            return false;
        };
        let budget = self.budget.as_secs_f64();

        if average > budget && !self.degraded {
            self.degraded = true;
            self.cap = 1;
            tracing::warn!(
                average_ms = average * 1000.0,
                budget_ms = budget * 1000.0,
                "steps over budget, limiting catch-up to one tick per frame"
            );
            return true;
        }
        if average <= budget && self.degraded {
            self.degraded = false;
            self.cap = self.max_catch_up;
            tracing::info!(
                average_ms = average * 1000.0,
                cap = self.cap,
                "steps back under budget, catch-up restored"
            );
            return true;
        }
        false
    }

    /// Drops accumulated time, e.g. after a pause.
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}

/// Largest `f32` below 1.0.
const MAX_ALPHA: f32 = 1.0 - f32::EPSILON / 2.0;

#[allow(clippy::cast_possible_truncation)]
fn nanos(n: u128) -> Duration {
    // Remainders are below one tick budget.
    Duration::from_nanos(n as u64)
}
