//! # Tick Loop
//!
//! ```text
//! Frame:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. ACCUMULATE                                                       │
//! │    └─ Clock turns elapsed wall time into N due ticks (capped)       │
//! │                                                                     │
//! │ 2. TICK (x N)                                                       │
//! │    ├─ advance          -> (previous, next, stable)                  │
//! │    ├─ step phase       -> workers call step(previous, next)         │
//! │    ├─ barrier          -> every worker has reported; next is whole  │
//! │    └─ publish_stable   -> stable = next, rotate                     │
//! │                                                                     │
//! │ 3. RENDER                                                           │
//! │    └─ draw(stable, interpolation) on every active entity            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A tick whose step phase fails is never published. The manager is left
//! mid-tick and every later `run_tick` reports
//! [`CoreError::RotationConflict`](cadence_core::CoreError::RotationConflict).

use std::time::{Duration, Instant};

use cadence_core::{StateManager, TickId, TickIndices};

use crate::clock::TickClock;
use crate::config::LoopConfig;
use crate::error::LoopResult;
use crate::registry::EntityRegistry;
use crate::workers::{step_range, StepPool};

/// What one tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Number of the published tick, starting at 1.
    pub tick: TickId,
    /// Indices the tick was stepped with.
    pub indices: TickIndices,
    /// Entities stepped.
    pub stepped: usize,
    /// Wall time from advance to publish.
    pub elapsed: Duration,
}

/// What one frame did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    /// Ticks run before rendering.
    pub ticks: u32,
    /// Entities drawn.
    pub drawn: usize,
    /// Interpolation passed to `draw`.
    pub interpolation: f32,
}

/// Accumulated tick timing.
#[derive(Clone, Debug)]
pub struct TickStatsAccumulator {
    /// Total ticks recorded.
    pub ticks_recorded: u64,
    /// Sum of entity steps.
    pub entities_stepped: u64,
    /// Sum of tick times.
    pub total_us_sum: u64,
    /// Min tick time.
    pub min_tick_us: u64,
    /// Max tick time.
    pub max_tick_us: u64,
    /// Ticks that exceeded budget.
    pub ticks_over_budget: u64,
}

impl TickStatsAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ticks_recorded: 0,
            entities_stepped: 0,
            total_us_sum: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            ticks_over_budget: 0,
        }
    }

    /// Records one tick.
    pub fn record(&mut self, report: &TickReport, budget: Duration) {
        let us = u64::try_from(report.elapsed.as_micros()).unwrap_or(u64::MAX);
        self.ticks_recorded += 1;
        self.entities_stepped += report.stepped as u64;
        self.total_us_sum = self.total_us_sum.saturating_add(us);
        self.min_tick_us = self.min_tick_us.min(us);
        self.max_tick_us = self.max_tick_us.max(us);
        if report.elapsed > budget {
            self.ticks_over_budget += 1;
        }
    }

    /// Average tick time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_tick_ms(&self) -> f64 {
        if self.ticks_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.ticks_recorded as f64) / 1000.0
    }
}

impl Default for TickStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the state manager, entity registry and clock, and drives ticks.
///
/// # Example
///
/// ```rust
/// use cadence::{Entity, LoopConfig, TickLoop};
/// use cadence::core::{CoreResult, StateBuffer};
///
/// struct Counter(StateBuffer<u64>);
///
/// impl Entity for Counter {
///     fn step(&self, previous: usize, next: usize) -> CoreResult<()> {
///         self.0.set(next, self.0.get(previous)? + 1)
///     }
///     fn draw(&self, stable: usize, _alpha: f32) -> CoreResult<()> {
///         self.0.get(stable).map(drop)
///     }
/// }
///
/// let mut tick_loop = TickLoop::new(LoopConfig::default())?;
/// let buffer = tick_loop.manager().create_buffer_filled(&0);
/// tick_loop.registry_mut().spawn(Counter(buffer));
///
/// let report = tick_loop.run_tick()?;
/// assert_eq!(report.tick, 1);
/// assert_eq!(tick_loop.render()?, 1);
/// # Ok::<(), cadence::LoopError>(())
/// ```
#[derive(Debug)]
pub struct TickLoop {
    config: LoopConfig,
    manager: StateManager,
    registry: EntityRegistry,
    clock: TickClock,
    /// Step workers; `None` steps on the calling thread.
    pool: Option<StepPool>,
    stats: TickStatsAccumulator,
}

impl TickLoop {
    /// Validates `config` and builds an idle loop with no entities.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting, or [`LoopError::WorkerSpawn`]
    /// if a step worker thread cannot be started.
    pub fn new(config: LoopConfig) -> LoopResult<Self> {
        config.validate()?;
        let manager = StateManager::from_config(&config.core)?;
        let registry = EntityRegistry::from_config(&config.core, config.initial_entity_capacity);
        let clock = TickClock::from_config(&config);
        let workers = config.resolved_workers();
        let pool = if workers > 1 {
            Some(StepPool::new(workers)?)
        } else {
            None
        };

        tracing::info!(
            tick_rate_hz = config.tick_rate_hz,
            depth = manager.depth().get(),
            workers,
            "tick loop ready"
        );

        Ok(Self {
            config,
            manager,
            registry,
            clock,
            pool,
            stats: TickStatsAccumulator::new(),
        })
    }

    /// The loop settings.
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// The state manager. Use it to create entity buffers and readers.
    #[must_use]
    pub const fn manager(&self) -> &StateManager {
        &self.manager
    }

    /// The entity registry.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Mutable entity registry, for spawning and despawning between ticks.
    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    /// The tick clock.
    #[must_use]
    pub const fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Accumulated tick timing.
    #[must_use]
    pub const fn stats(&self) -> &TickStatsAccumulator {
        &self.stats
    }

    /// Step-phase worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(1, StepPool::len)
    }

    /// Runs one complete tick: advance, parallel step, publish.
    ///
    /// # Errors
    ///
    /// Returns the first step error or [`LoopError::WorkerPanicked`]; the
    /// tick is then not published. Protocol errors from the manager pass
    /// through.
    ///
    /// A panicking step is reported as [`LoopError::WorkerPanicked`] only
    /// when panics unwind. The workspace dev and release profiles set
    /// `panic = "abort"`, so outside `cargo test` a panicking step aborts
    /// the process instead.
    pub fn run_tick(&mut self) -> LoopResult<TickReport> {
        let started = Instant::now();
        let indices = self.manager.advance()?;
        let tick = self.manager.tick() + 1;

        let table = self.registry.table();
        let stepped = match &self.pool {
            Some(pool) => pool.run(table, indices, tick)?,
            None => step_range(table, 0..table.len(), indices)?,
        };
        self.manager.publish_stable(indices.next())?;

        let report = TickReport {
            tick: self.manager.tick(),
            indices,
            stepped,
            elapsed: started.elapsed(),
        };

        let budget = self.clock.budget();
        self.stats.record(&report, budget);
        self.clock.adapt(self.manager.step_stats());

        if report.elapsed > budget.mul_f64(self.config.slow_tick_factor) {
            tracing::warn!(
                tick = report.tick,
                elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
                budget_ms = budget.as_secs_f64() * 1000.0,
                stepped,
                "slow tick"
            );
        }
        Ok(report)
    }

    /// Draws every active entity from the stable index.
    ///
    /// Returns the number of entities drawn.
    ///
    /// # Errors
    ///
    /// Returns the first `draw` error.
    pub fn render(&self) -> LoopResult<usize> {
        let stable = self.manager.current_indices().stable();
        let interpolation = self.clock.interpolation();
        let mut drawn = 0;
        for (_, entity) in self.registry.active() {
            entity.draw(stable, interpolation)?;
            drawn += 1;
        }
        Ok(drawn)
    }

    /// Runs the ticks due after `elapsed` wall time, then renders.
    ///
    /// # Errors
    ///
    /// Stops at the first failing tick or draw.
    pub fn frame(&mut self, elapsed: Duration) -> LoopResult<FrameReport> {
        let ticks = self.clock.accumulate(elapsed);
        for _ in 0..ticks {
            self.run_tick()?;
        }
        let drawn = self.render()?;
        Ok(FrameReport {
            ticks,
            drawn,
            interpolation: self.clock.interpolation(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{CoreError, CoreResult, StateBuffer};

    use crate::entity::Entity;
    use crate::error::LoopError;

    struct Counter {
        value: StateBuffer<u64>,
    }

    impl Entity for Counter {
        fn step(&self, previous: usize, next: usize) -> CoreResult<()> {
            let value = self.value.get(previous)?;
            self.value.set(next, value + 1)
        }

        fn draw(&self, stable: usize, _interpolation: f32) -> CoreResult<()> {
            self.value.get(stable).map(drop)
        }
    }

    struct Faulty;

    impl Entity for Faulty {
        fn step(&self, _previous: usize, _next: usize) -> CoreResult<()> {
            Err(CoreError::IndexOutOfRange { index: 9, len: 3 })
        }

        fn draw(&self, _stable: usize, _interpolation: f32) -> CoreResult<()> {
            Ok(())
        }
    }

    struct Panicking;

    impl Entity for Panicking {
        fn step(&self, _previous: usize, _next: usize) -> CoreResult<()> {
            panic!("step failed");
        }

        fn draw(&self, _stable: usize, _interpolation: f32) -> CoreResult<()> {
            Ok(())
        }
    }

    fn test_loop(workers: usize) -> TickLoop {
        TickLoop::new(LoopConfig {
            worker_threads: workers,
            ..LoopConfig::default()
        })
        .unwrap()
    }

    fn spawn_counter(tick_loop: &mut TickLoop) -> std::sync::Arc<Counter> {
        let counter = std::sync::Arc::new(Counter {
            value: tick_loop.manager().create_buffer_filled(&0),
        });
        tick_loop
            .registry_mut()
            .spawn_shared(std::sync::Arc::<Counter>::clone(&counter))
            .unwrap();
        counter
    }

    #[test]
    fn test_run_tick_steps_and_publishes() {
        for workers in [1, 4] {
            let mut tick_loop = test_loop(workers);
            let counters: Vec<_> = (0..10).map(|_| spawn_counter(&mut tick_loop)).collect();

            for expected in 1..=5 {
                let report = tick_loop.run_tick().unwrap();
                assert_eq!(report.tick, expected);
                assert_eq!(report.stepped, 10);
            }

            let stable = tick_loop.manager().current_indices().stable();
            for counter in &counters {
                assert_eq!(counter.value.get(stable).unwrap(), 5);
            }
            assert_eq!(tick_loop.stats().ticks_recorded, 5);
            assert_eq!(tick_loop.stats().entities_stepped, 50);
        }
    }

    #[test]
    fn test_workers_persist_across_ticks() {
        let mut tick_loop = test_loop(3);
        assert_eq!(tick_loop.workers(), 3);
        assert_eq!(test_loop(1).workers(), 1);

        let first = spawn_counter(&mut tick_loop);
        for _ in 0..20 {
            tick_loop.run_tick().unwrap();
        }
        // Spawning between ticks works on a table no worker still holds.
        let second = spawn_counter(&mut tick_loop);
        assert_eq!(tick_loop.run_tick().unwrap().stepped, 2);

        let stable = tick_loop.manager().current_indices().stable();
        assert_eq!(first.value.get(stable).unwrap(), 21);
        assert_eq!(second.value.get(stable).unwrap(), 1);
    }

    #[test]
    fn test_inactive_entities_are_skipped() {
        let mut tick_loop = test_loop(2);
        let counter = spawn_counter(&mut tick_loop);
        let _other = spawn_counter(&mut tick_loop);
        let first = tick_loop.registry().active().next().map(|(h, _)| h).unwrap();
        tick_loop.registry_mut().set_active(first, false).unwrap();

        let report = tick_loop.run_tick().unwrap();
        assert_eq!(report.stepped, 1);
        assert_eq!(tick_loop.render().unwrap(), 1);
        let stable = tick_loop.manager().current_indices().stable();
        assert_eq!(counter.value.get(stable).unwrap(), 0);
    }

    #[test]
    fn test_frame_runs_due_ticks() {
        let mut tick_loop = test_loop(1);
        spawn_counter(&mut tick_loop);
        let budget = tick_loop.clock().budget();

        let report = tick_loop.frame(budget * 2 + budget / 2).unwrap();
        assert_eq!(report.ticks, 2);
        assert_eq!(report.drawn, 1);
        assert!((report.interpolation - 0.5).abs() < 1e-3);
        assert_eq!(tick_loop.manager().tick(), 2);

        let report = tick_loop.frame(Duration::ZERO).unwrap();
        assert_eq!(report.ticks, 0);
    }

    #[test]
    fn test_step_error_aborts_tick() {
        let mut tick_loop = test_loop(2);
        spawn_counter(&mut tick_loop);
        tick_loop.registry_mut().spawn(Faulty).unwrap();

        assert_eq!(
            tick_loop.run_tick(),
            Err(LoopError::Core(CoreError::IndexOutOfRange { index: 9, len: 3 }))
        );
        assert_eq!(tick_loop.manager().tick(), 0);
        assert!(tick_loop.manager().is_stepping());
        assert_eq!(
            tick_loop.run_tick(),
            Err(LoopError::Core(CoreError::RotationConflict))
        );
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let mut tick_loop = test_loop(2);
        spawn_counter(&mut tick_loop);
        tick_loop.registry_mut().spawn(Panicking).unwrap();

        assert_eq!(
            tick_loop.run_tick(),
            Err(LoopError::WorkerPanicked { tick: 1 })
        );
        assert_eq!(tick_loop.manager().tick(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LoopConfig {
            tick_rate_hz: 0,
            ..LoopConfig::default()
        };
        assert!(matches!(
            TickLoop::new(config),
            Err(LoopError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_stats_accumulator() {
        let mut stats = TickStatsAccumulator::new();
        assert_eq!(stats.avg_tick_ms(), 0.0);
        let report = TickReport {
            tick: 1,
            indices: StateManager::new(cadence_core::BufferDepth::TRIPLE).current_indices(),
            stepped: 3,
            elapsed: Duration::from_millis(4),
        };
        stats.record(&report, Duration::from_millis(2));
        assert_eq!(stats.ticks_over_budget, 1);
        assert_eq!(stats.min_tick_us, 4000);
        assert!((stats.avg_tick_ms() - 4.0).abs() < 1e-9);
    }
}
