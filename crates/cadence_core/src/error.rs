//! # Core Error Types
//!
//! All errors that can occur in the core primitives.
//!
//! Construction and protocol errors indicate a bug in the driving code and
//! are never retried. Allocator exhaustion is the one expected condition and
//! is normally reported as `None` from [`HandleAllocator::acquire`]; the
//! [`CoreError::AllocatorExhausted`] variant only appears when the caller asks
//! for it through `try_acquire`.
//!
//! [`HandleAllocator::acquire`]: crate::HandleAllocator::acquire

use thiserror::Error;

/// Errors that can occur in the core primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A state buffer was created with the wrong number of initial values.
    #[error("size mismatch: expected {expected} values, got {actual}")]
    SizeMismatch {
        /// The configured buffer depth.
        expected: usize,
        /// The number of values supplied.
        actual: usize,
    },

    /// An index fell outside `[0, len)`.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The container length.
        len: usize,
    },

    /// `advance` was called while a step phase was still open.
    #[error("rotation conflict: advance called before the previous tick was published")]
    RotationConflict,

    /// `publish_stable` was called twice for the same tick.
    #[error("double publish: tick already published")]
    DoublePublish,

    /// `publish_stable` was given an index other than the one being written.
    #[error("publish mismatch: expected index {expected}, got {actual}")]
    PublishMismatch {
        /// The `next` index of the open tick.
        expected: usize,
        /// The index passed by the caller.
        actual: usize,
    },

    /// The handle allocator has minted every value up to its maximum.
    #[error("allocator exhausted: maximum handle {max} reached")]
    AllocatorExhausted {
        /// The configured maximum handle value.
        max: u32,
    },

    /// A handle was released twice, or released without being issued.
    #[error("stale handle: {0} is not live")]
    StaleHandle(u32),

    /// A notification was dispatched without an event payload.
    #[error("notify called without event arguments")]
    NullArguments,

    /// Buffer depth below the minimum of two.
    #[error("invalid buffer depth {0}: at least 2 buffers are required")]
    InvalidDepth(usize),

    /// A fixed-capacity container was created with zero capacity.
    #[error("capacity must be greater than zero")]
    InvalidCapacity,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Checks `index` against `len`, producing [`CoreError::IndexOutOfRange`].
#[inline]
pub(crate) fn check_index(index: usize, len: usize) -> CoreResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(CoreError::IndexOutOfRange { index, len })
    }
}
