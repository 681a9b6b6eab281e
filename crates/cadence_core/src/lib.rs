//! # Cadence Core
//!
//! Runtime primitives that let a simulation advance on one schedule while a
//! renderer observes a stable, non-tearing snapshot on another:
//! - N-buffered per-entity state and the index rotation protocol
//! - Small reusable integer handles instead of addresses
//! - Thread-safe running statistics for tick timing
//! - Packed per-entity boolean flags
//! - Cancellable lifecycle notification with owner-thread delivery
//!
//! ## Architecture Rules
//!
//! 1. **One writer per slot per tick** - entities write only `next`
//! 2. **Readers see only `stable`** - published once per tick, immutable until the next publish
//! 3. **Protocol misuse is loud** - out-of-order advance/publish is an error, never corrected
//!
//! ## Example
//!
//! ```rust
//! use cadence_core::{BufferDepth, HandleAllocator, StateManager};
//!
//! let mut manager = StateManager::new(BufferDepth::TRIPLE);
//! let handles = HandleAllocator::unbounded();
//!
//! let _entity = handles.acquire();
//! let position = manager.create_buffer(vec![0.0f32; 3])?;
//!
//! let tick = manager.advance()?;
//! position.set(tick.next(), position.get(tick.previous())? + 1.0)?;
//! manager.publish_stable(tick.next())?;
//!
//! assert_eq!(position.get(manager.current_indices().stable())?, 1.0);
//! # Ok::<(), cadence_core::CoreError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod stats;
pub mod sync;

pub use config::{BoundsCheck, CoreConfig};
pub use error::{CoreError, CoreResult};
pub use events::{EventArgs, LifecycleNotifier, Mailbox, MailboxAddress, NotifyOutcome, SubscriptionId};
pub use memory::{BitFlags, FlagIter, Handle, HandleAllocator};
pub use stats::{RunningStats, StatsSnapshot};
pub use sync::{
    BufferDepth, RotationEvent, StableReader, StateBuffer, StateManager, StepView, TickId,
    TickIndices,
};
