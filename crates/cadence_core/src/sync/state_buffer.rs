//! # Per-Entity State Buffer
//!
//! `N` versions of one entity's state, one per buffer index.
//!
//! ## Access Discipline
//!
//! ```text
//! step(previous, next):  read slot[previous], write slot[next]
//! draw(stable):          read slot[stable], never write
//! ```
//!
//! Each slot sits behind its own lock so that `draw` on the stable slot can
//! run while the next tick's `step` writes a different slot. When callers
//! follow the rotation handed out by [`StateManager`](super::StateManager)
//! no two threads ever touch the same slot with a writer present, so these
//! locks are never contended and `get`/`set` never wait.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::depth::BufferDepth;
use super::state_manager::TickIndices;
use crate::config::BoundsCheck;
use crate::error::{check_index, CoreError, CoreResult};

/// Fixed-depth array of state snapshots for one entity.
///
/// # Example
///
/// ```rust
/// use cadence_core::{BufferDepth, StateBuffer};
///
/// let buffer = StateBuffer::new(BufferDepth::TRIPLE, vec![0, 0, 0])?;
/// buffer.set(1, 10)?;
/// assert_eq!(buffer.get(1)?, 10);
/// assert!(StateBuffer::new(BufferDepth::TRIPLE, vec![0, 0]).is_err());
/// # Ok::<(), cadence_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct StateBuffer<T> {
    slots: Box<[RwLock<T>]>,
    bounds: BoundsCheck,
}

impl<T> StateBuffer<T> {
    /// Creates a buffer from exactly `depth` initial values, checked access.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SizeMismatch`] if `values.len() != depth`.
    pub fn new(depth: BufferDepth, values: Vec<T>) -> CoreResult<Self> {
        Self::with_bounds(depth, values, BoundsCheck::Checked)
    }

    /// Creates a buffer with the given indexed-access policy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SizeMismatch`] if `values.len() != depth`.
    pub fn with_bounds(depth: BufferDepth, values: Vec<T>, bounds: BoundsCheck) -> CoreResult<Self> {
        if values.len() != depth.get() {
            return Err(CoreError::SizeMismatch {
                expected: depth.get(),
                actual: values.len(),
            });
        }
        Ok(Self {
            slots: values.into_iter().map(RwLock::new).collect(),
            bounds,
        })
    }

    /// Creates a buffer whose slot `i` is `init(i)`.
    pub fn from_fn(depth: BufferDepth, bounds: BoundsCheck, init: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: (0..depth.get()).map(init).map(RwLock::new).collect(),
            bounds,
        }
    }

    /// Number of slots (`N`).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false; a buffer holds at least two slots.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    fn slot(&self, index: usize) -> CoreResult<&RwLock<T>> {
        if self.bounds.is_checked() {
            check_index(index, self.slots.len())?;
        }
        Ok(&self.slots[index])
    }

    /// Borrows slot `index` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index >= N` (checked mode).
    pub fn read(&self, index: usize) -> CoreResult<RwLockReadGuard<'_, T>> {
        Ok(self.slot(index)?.read())
    }

    /// Borrows slot `index` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index >= N` (checked mode).
    pub fn write(&self, index: usize) -> CoreResult<RwLockWriteGuard<'_, T>> {
        Ok(self.slot(index)?.write())
    }

    /// Replaces the value in slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index >= N` (checked mode).
    pub fn set(&self, index: usize, value: T) -> CoreResult<()> {
        *self.slot(index)?.write() = value;
        Ok(())
    }

    /// Opens the step view for a tick: `previous` read-only, `next` writable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if the indices were issued for
    /// a deeper buffer (checked mode).
    pub fn step_view(&self, indices: TickIndices) -> CoreResult<StepView<'_, T>> {
        let previous = self.slot(indices.previous())?;
        let next = self.slot(indices.next())?;
        // `previous != next` is guaranteed by the rotation.
        Ok(StepView {
            previous: previous.read(),
            next: next.write(),
        })
    }

    /// Consumes the buffer, returning the slot values in index order.
    #[must_use]
    pub fn into_inner(self) -> Vec<T> {
        self.slots
            .into_vec()
            .into_iter()
            .map(RwLock::into_inner)
            .collect()
    }
}

impl<T: Clone> StateBuffer<T> {
    /// Returns a copy of slot `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `index >= N` (checked mode).
    pub fn get(&self, index: usize) -> CoreResult<T> {
        Ok(self.slot(index)?.read().clone())
    }
}

/// Step-phase access to one state buffer: the previous slot for reading and
/// the next slot for writing.
pub struct StepView<'a, T> {
    previous: RwLockReadGuard<'a, T>,
    next: RwLockWriteGuard<'a, T>,
}

impl<T> StepView<'_, T> {
    /// The state completed last tick.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> &T {
        &self.previous
    }

    /// The state being produced this tick.
    #[inline]
    pub fn next_mut(&mut self) -> &mut T {
        &mut self.next
    }

    /// Overwrites the state being produced this tick.
    #[inline]
    pub fn write_next(&mut self, value: T) {
        *self.next = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::StateManager;

    #[test]
    fn test_create_requires_exact_depth() {
        let depth = BufferDepth::TRIPLE;
        assert_eq!(
            StateBuffer::new(depth, vec![1, 2]).unwrap_err(),
            CoreError::SizeMismatch { expected: 3, actual: 2 }
        );
        assert_eq!(
            StateBuffer::new(depth, vec![1, 2, 3, 4]).unwrap_err(),
            CoreError::SizeMismatch { expected: 3, actual: 4 }
        );

        let buffer = StateBuffer::new(depth, vec![10, 20, 30]).unwrap();
        for (i, expected) in [10, 20, 30].into_iter().enumerate() {
            assert_eq!(buffer.get(i).unwrap(), expected);
        }
    }

    #[test]
    fn test_bounds_checked() {
        let buffer = StateBuffer::new(BufferDepth::DOUBLE, vec![0u8, 0]).unwrap();
        assert_eq!(
            buffer.get(2).unwrap_err(),
            CoreError::IndexOutOfRange { index: 2, len: 2 }
        );
        assert!(buffer.set(5, 1).is_err());
        assert!(buffer.read(2).is_err());
    }

    #[test]
    fn test_set_and_read() {
        let buffer = StateBuffer::from_fn(BufferDepth::TRIPLE, BoundsCheck::Checked, |i| i * 2);
        assert_eq!(*buffer.read(2).unwrap(), 4);
        buffer.set(2, 99).unwrap();
        assert_eq!(*buffer.read(2).unwrap(), 99);
        assert_eq!(buffer.into_inner(), vec![0, 2, 99]);
    }

    #[test]
    fn test_unchecked_in_range_access() {
        let buffer =
            StateBuffer::with_bounds(BufferDepth::DOUBLE, vec![1, 2], BoundsCheck::Unchecked).unwrap();
        buffer.set(1, 5).unwrap();
        assert_eq!(buffer.get(1).unwrap(), 5);
    }

    #[test]
    fn test_step_view_reads_previous_writes_next() {
        let mut manager = StateManager::new(BufferDepth::TRIPLE);
        let buffer = manager.create_buffer(vec![1, 0, 0]).unwrap();

        let indices = manager.advance().unwrap();
        {
            let mut view = buffer.step_view(indices).unwrap();
            let value = *view.previous() + 1;
            view.write_next(value);
        }
        manager.publish_stable(indices.next()).unwrap();

        assert_eq!(buffer.get(manager.current_indices().stable()).unwrap(), 2);
    }

    #[test]
    fn test_stable_read_while_next_written() {
        let mut manager = StateManager::new(BufferDepth::TRIPLE);
        let buffer = manager.create_buffer(vec![7, 0, 0]).unwrap();
        let stable = manager.current_indices().stable();

        let indices = manager.advance().unwrap();
        let mut view = buffer.step_view(indices).unwrap();
        *view.next_mut() = 8;

        // Renderer reads the stable slot while the step view is open.
        assert_eq!(*buffer.read(stable).unwrap(), 7);
    }
}
