//! # Handle Allocator
//!
//! Issues small reusable integers so entities can be referenced by index
//! instead of by address.
//!
//! Released values are always reissued before a new value is minted, lowest
//! value first. Handles carry no generation: using a handle after releasing
//! it is a caller bug. With liveness tracking enabled the allocator does
//! reject double release and release of a value it never issued.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use parking_lot::Mutex;

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::memory::BitFlags;

/// A small non-negative integer identifying a live entity.
///
/// Values are reused after release, so a handle is only meaningful while
/// the entity it was issued for is alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    /// Wraps a raw handle value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the value as an index into per-entity tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State behind the allocator lock.
#[derive(Debug)]
struct AllocatorState {
    /// The next value to mint (`top + 1`).
    next_fresh: u64,
    /// Released values awaiting reuse, lowest first.
    released: BinaryHeap<Reverse<u32>>,
    /// Number of handles currently issued.
    acquired: usize,
    /// Live set, present only when tracking is enabled.
    live: Option<BitFlags>,
}

impl AllocatorState {
    fn new(track: bool) -> Self {
        Self {
            next_fresh: 0,
            released: BinaryHeap::new(),
            acquired: 0,
            live: track.then(|| BitFlags::new(0)),
        }
    }

    fn mark_live(&mut self, value: u32) {
        if let Some(live) = self.live.as_mut() {
            let index = value as usize;
            if index >= live.len() {
                live.resize((index + 1).max(live.len() * 2).max(64));
            }
            live.set_or_grow(index, true);
        }
    }
}

/// Thread-safe allocator of reusable integer handles.
///
/// All operations run under one short lock, so concurrent `acquire` and
/// `release` calls from several workers never double-issue a value and
/// never lose a released one.
///
/// # Example
///
/// ```rust
/// use cadence_core::HandleAllocator;
///
/// let alloc = HandleAllocator::with_max(1);
/// let a = alloc.acquire().unwrap();
/// let _b = alloc.acquire().unwrap();
/// assert!(alloc.acquire().is_none()); // exhausted
///
/// alloc.release(a)?;
/// assert_eq!(alloc.acquire(), Some(a));
/// # Ok::<(), cadence_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct HandleAllocator {
    /// Largest value that may be minted.
    max: Option<u32>,
    state: Mutex<AllocatorState>,
}

impl HandleAllocator {
    /// Creates an allocator with no upper bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(None, false)
    }

    /// Creates an allocator that mints at most the values `0..=max`.
    #[must_use]
    pub fn with_max(max: u32) -> Self {
        Self::new(Some(max), false)
    }

    /// Creates an allocator with an optional maximum and optional liveness
    /// tracking.
    #[must_use]
    pub fn new(max: Option<u32>, track_handles: bool) -> Self {
        Self {
            max,
            state: Mutex::new(AllocatorState::new(track_handles)),
        }
    }

    /// Creates an allocator from the `max_handle` and `track_handles` keys.
    #[must_use]
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.max_handle, config.track_handles)
    }

    /// The configured maximum handle value.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> Option<u32> {
        self.max
    }

    /// Returns whether liveness tracking is enabled.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.state.lock().live.is_some()
    }

    /// Issues a handle.
    ///
    /// Returns the lowest released value if there is one, otherwise mints
    /// `top + 1`. Returns `None` once every value up to the maximum has been
    /// minted and none are released; that is an expected condition, not an
    /// error.
    pub fn acquire(&self) -> Option<Handle> {
        let mut state = self.state.lock();

        let value = if let Some(Reverse(value)) = state.released.pop() {
            value
        } else {
            let limit = self.max.map_or(u64::from(u32::MAX), u64::from);
            if state.next_fresh > limit {
                drop(state);
                tracing::warn!(max = limit, "handle allocator exhausted");
                return None;
            }
            // Bounded by `limit`, which fits in u32.
            let value = u32::try_from(state.next_fresh).ok()?;
            state.next_fresh += 1;
            value
        };

        state.acquired += 1;
        state.mark_live(value);
        tracing::trace!(handle = value, "handle acquired");
        Some(Handle(value))
    }

    /// Issues a handle, reporting exhaustion as an error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AllocatorExhausted`] when [`acquire`] would
    /// return `None`.
    ///
    /// [`acquire`]: Self::acquire
    pub fn try_acquire(&self) -> CoreResult<Handle> {
        self.acquire().ok_or(CoreError::AllocatorExhausted {
            max: self.max.unwrap_or(u32::MAX),
        })
    }

    /// Returns `handle` to the reuse pool.
    ///
    /// Without tracking, releasing a value twice or releasing a value that
    /// was never issued is not detected and corrupts later issuance.
    ///
    /// # Errors
    ///
    /// With tracking enabled, returns [`CoreError::StaleHandle`] if `handle`
    /// is not currently live.
    pub fn release(&self, handle: Handle) -> CoreResult<()> {
        let mut state = self.state.lock();

        if let Some(live) = state.live.as_mut() {
            if !live.get(handle.index()).unwrap_or(false) {
                return Err(CoreError::StaleHandle(handle.0));
            }
            live.set(handle.index(), false)?;
        }

        state.released.push(Reverse(handle.0));
        state.acquired = state.acquired.saturating_sub(1);
        tracing::trace!(handle = handle.0, "handle released");
        Ok(())
    }

    /// Returns whether `handle` is live, or `None` when tracking is off.
    #[must_use]
    pub fn is_live(&self, handle: Handle) -> Option<bool> {
        let state = self.state.lock();
        state
            .live
            .as_ref()
            .map(|live| live.get(handle.index()).unwrap_or(false))
    }

    /// Number of handles currently issued.
    #[must_use]
    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    /// Total number of distinct values this allocator may issue
    /// (`max + 1`), or `None` when unbounded.
    #[must_use]
    pub fn available(&self) -> Option<u64> {
        self.max.map(|max| u64::from(max) + 1)
    }

    /// `available - acquired`, or `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        let acquired = self.acquired() as u64;
        self.available().map(|available| available.saturating_sub(acquired))
    }

    /// Number of distinct values minted so far (`top + 1`).
    #[must_use]
    pub fn minted(&self) -> u64 {
        self.state.lock().next_fresh
    }

    /// Forgets every issued and released value.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let track = state.live.is_some();
        *state = AllocatorState::new(track);
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::unbounded()
    }
}
