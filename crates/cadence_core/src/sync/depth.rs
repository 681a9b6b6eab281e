//! Buffer depth (`N`), fixed at startup and shared by every state buffer.

use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Number of parallel state snapshots kept per entity. Always at least 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferDepth(usize);

impl BufferDepth {
    /// Two buffers: one written, one read. A renderer lagging by a tick may
    /// observe the writer.
    pub const DOUBLE: Self = Self(2);

    /// Three buffers: the stable slot is never the slot being written nor
    /// the slot written next.
    pub const TRIPLE: Self = Self(3);

    /// Validates a depth.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDepth`] if `n < 2`.
    pub fn new(n: usize) -> CoreResult<Self> {
        if n < 2 {
            return Err(CoreError::InvalidDepth(n));
        }
        Ok(Self(n))
    }

    /// The depth as a count.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl Default for BufferDepth {
    fn default() -> Self {
        Self::TRIPLE
    }
}

impl fmt::Display for BufferDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
