//! # Cadence
//!
//! Fixed-timestep simulation driver built on [`cadence_core`].
//!
//! ```text
//!   wall time ──> TickClock ──> N ticks ──> TickLoop::run_tick
//!                                             ├─ advance
//!                                             ├─ step workers (pooled)
//!                                             └─ publish_stable
//!                                  render ──> draw(stable, interpolation)
//! ```
//!
//! ## Modules
//!
//! - `clock`: Fixed timestep and adaptive catch-up
//! - `config`: Loop settings from TOML
//! - `entity`: The step/draw contract
//! - `registry`: Handle-indexed entity table and lifecycle events
//! - `tick_loop`: Tick and frame orchestration

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![deny(clippy::perf)]
#![warn(clippy::pedantic)]

pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod registry;
pub mod tick_loop;
mod workers;

// Re-export the primitives
pub use cadence_core as core;

pub use clock::TickClock;
pub use config::LoopConfig;
pub use entity::Entity;
pub use error::{LoopError, LoopResult};
pub use registry::{EntityEvent, EntityRef, EntityRegistry};
pub use tick_loop::{FrameReport, TickLoop, TickReport, TickStatsAccumulator};
