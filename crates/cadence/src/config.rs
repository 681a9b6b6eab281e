//! # Loop Configuration
//!
//! ```toml
//! tick_rate_hz = 60
//! max_catch_up_ticks = 5
//! worker_threads = 0      # 0 = available parallelism
//! slow_tick_factor = 2.0
//! initial_entity_capacity = 1024
//!
//! [core]
//! buffer_depth = 3
//! ```

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use cadence_core::CoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::{LoopError, LoopResult};

/// Highest tick rate with a whole-nanosecond budget.
pub const MAX_TICK_RATE_HZ: u32 = 1_000_000_000;

/// Configuration for the tick loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    /// Settings for the core primitives.
    pub core: CoreConfig,
    /// Simulation ticks per second, in `1..=MAX_TICK_RATE_HZ`.
    pub tick_rate_hz: u32,
    /// Most ticks a single frame may run to catch up.
    pub max_catch_up_ticks: u32,
    /// Step-phase worker threads. Zero picks the available parallelism.
    pub worker_threads: usize,
    /// A tick slower than this multiple of the budget is logged.
    pub slow_tick_factor: f64,
    /// Registry slots reserved up front.
    pub initial_entity_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            core: CoreConfig::default(),
            tick_rate_hz: 60,
            max_catch_up_ticks: 5,
            worker_threads: 0,
            slow_tick_factor: 2.0,
            initial_entity_capacity: 1024,
        }
    }
}

impl LoopConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::InvalidConfig`] for malformed TOML or a bad loop
    /// setting, and [`LoopError::Core`] for a bad `[core]` section.
    pub fn from_toml_str(text: &str) -> LoopResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| LoopError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Same as [`LoopConfig::from_toml_str`], plus
    /// [`LoopError::InvalidConfig`] if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> LoopResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoopError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks the loop settings and the nested core settings.
    ///
    /// # Errors
    ///
    /// Returns the first violated setting.
    pub fn validate(&self) -> LoopResult<()> {
        self.core.validate()?;
        if self.tick_rate_hz == 0 {
            return Err(LoopError::InvalidConfig(
                "tick_rate_hz must be greater than zero".to_string(),
            ));
        }
        if self.tick_rate_hz > MAX_TICK_RATE_HZ {
            return Err(LoopError::InvalidConfig(format!(
                "tick_rate_hz must be at most {MAX_TICK_RATE_HZ}, got {}",
                self.tick_rate_hz
            )));
        }
        if self.max_catch_up_ticks == 0 {
            return Err(LoopError::InvalidConfig(
                "max_catch_up_ticks must be at least 1".to_string(),
            ));
        }
        if !self.slow_tick_factor.is_finite() || self.slow_tick_factor <= 0.0 {
            return Err(LoopError::InvalidConfig(format!(
                "slow_tick_factor must be positive, got {}",
                self.slow_tick_factor
            )));
        }
        Ok(())
    }

    /// Fixed simulation time per tick.
    #[must_use]
    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }

    /// Worker count with zero resolved to the machine's parallelism.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        match self.worker_threads {
            0 => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        }
    }
}
