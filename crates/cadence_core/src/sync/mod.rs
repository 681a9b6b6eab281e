//! # Synchronization Primitives for Simulation and Render
//!
//! ## The Problem
//!
//! ```text
//! Simulation threads:  WRITE entity state every tick
//! Render thread:       READ entity state every frame
//!
//! Without discipline: reader sees half-written state → TEARING
//! With a global lock:  render waits on simulation → STALLS
//! ```
//!
//! ## The Solution: N-Buffered State
//!
//! ```text
//! Tick k:
//!   step(previous, next) writes slot[next] from slot[previous]
//!   draw(stable) reads slot[stable]          (stable != next)
//!
//! End of tick k:
//!   publish_stable(next)  → stable = next
//!   rotate                → previous = stable, next = stable + 1 mod N
//! ```
//!
//! The index assignment is a plain value handed to every `step` and `draw`
//! call; nothing reads it from ambient global state.

mod depth;
mod state_buffer;
mod state_manager;

pub use depth::BufferDepth;
pub use state_buffer::{StateBuffer, StepView};
pub use state_manager::{RotationEvent, StableReader, StateManager, TickId, TickIndices};
