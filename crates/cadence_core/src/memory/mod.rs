//! # Memory Management
//!
//! Compact per-entity bookkeeping.
//!
//! ## Design Philosophy
//!
//! Entities are referenced by small reusable integers, and their boolean
//! attributes are packed 8 to a byte:
//! - No addresses handed out, so storage may move freely
//! - No per-entity heap allocation for flags
//! - Predictable, flat memory use

mod flags;
mod handles;

pub use flags::{BitFlags, Iter as FlagIter};
pub use handles::{Handle, HandleAllocator};
