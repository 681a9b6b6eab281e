//! # Driver Error Types
//!
//! Core protocol errors pass through unchanged. The driver adds only what
//! the core cannot see: worker threads and loop configuration.

use cadence_core::CoreError;
use thiserror::Error;

/// Errors that can occur while driving ticks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopError {
    /// A core primitive rejected an operation.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A step worker panicked. The tick was not published.
    #[error("step worker panicked during tick {tick}")]
    WorkerPanicked {
        /// The tick being produced when the worker died.
        tick: u64,
    },

    /// A step worker thread could not be started.
    #[error("cannot start step worker: {0}")]
    WorkerSpawn(String),

    /// Invalid loop configuration.
    #[error("invalid loop config: {0}")]
    InvalidConfig(String),
}

/// Result type for driver operations.
pub type LoopResult<T> = Result<T, LoopError>;
