//! # State Manager
//!
//! Owns the buffer depth and the index assignment, and drives the rotation
//! protocol that keeps writers and readers on different buffers.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────┐
//!                 │           StateManager           │
//!                 │  depth N   {previous,next,stable}│
//!                 └───────┬───────────────┬──────────┘
//!                         │               │
//!          advance() ─────┘               └───── publish_stable(next)
//!                         │               │
//!              ┌──────────▼─────┐   ┌─────▼──────────┐
//!              │ step(prev,next)│   │  StableReader  │
//!              │ (all entities) │   │ (render thread)│
//!              └────────────────┘   └────────────────┘
//! ```
//!
//! ## Rotation
//!
//! Publishing makes the freshly written `next` the new `stable`, then
//! rotates: the following tick reads `previous = stable` and writes
//! `next = (stable + 1) mod N`. `next` is therefore never `stable` and never
//! `previous`. With `N = 3` it is also never the slot that was stable one
//! tick earlier, so a renderer lagging by a tick still does not tear.
//!
//! The protocol is a strict alternation: `advance`, every entity steps,
//! `publish_stable`, repeat. Breaking it is a driver bug and fails loudly.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::depth::BufferDepth;
use super::state_buffer::StateBuffer;
use crate::config::{BoundsCheck, CoreConfig};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventArgs, LifecycleNotifier};
use crate::stats::RunningStats;

/// Number of step-phase durations kept when no window is configured.
const DEFAULT_STATS_WINDOW: usize = 120;

/// Sequence number of a tick. Tick `k` publishes the `k`-th stable state.
pub type TickId = u64;

/// The index assignment for one tick.
///
/// Only the [`StateManager`] creates these, so `previous != next` and
/// `stable != next` always hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TickIndices {
    previous: usize,
    next: usize,
    stable: usize,
}

impl TickIndices {
    /// The slot step logic reads from.
    #[inline]
    #[must_use]
    pub const fn previous(self) -> usize {
        self.previous
    }

    /// The slot step logic writes to.
    #[inline]
    #[must_use]
    pub const fn next(self) -> usize {
        self.next
    }

    /// The most recently published slot, the only one renderers may read.
    #[inline]
    #[must_use]
    pub const fn stable(self) -> usize {
        self.stable
    }

    /// Assignment for the tick after `stable` was published.
    #[inline]
    const fn after_publish(stable: usize, depth: BufferDepth) -> Self {
        Self {
            previous: stable,
            next: (stable + 1) % depth.get(),
            stable,
        }
    }
}

/// Buffer rotation transitions announced through the manager's notifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotationEvent {
    /// A step phase opened with these indices.
    Advanced(TickIndices),
    /// A tick was published; the indices are those of the following tick.
    Published(TickIndices),
}

/// State shared with [`StableReader`]s.
#[derive(Debug)]
struct Published {
    stable: AtomicUsize,
    tick: AtomicU64,
}

/// Read-only view of the published stable index for render threads.
///
/// Cheap to clone and `Send + Sync`; it observes every
/// [`StateManager::publish_stable`] without borrowing the manager.
#[derive(Clone, Debug)]
pub struct StableReader {
    published: Arc<Published>,
}

impl StableReader {
    /// The stable index at the time of the call.
    #[inline]
    #[must_use]
    pub fn stable(&self) -> usize {
        self.published.stable.load(Ordering::Acquire)
    }

    /// Number of ticks published so far.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> TickId {
        self.published.tick.load(Ordering::Acquire)
    }
}

/// Coordinator for the multi-buffer rotation protocol.
///
/// ## Usage
///
/// ```rust
/// use cadence_core::{BufferDepth, StateManager};
///
/// let mut manager = StateManager::new(BufferDepth::TRIPLE);
/// let counter = manager.create_buffer(vec![0u32; 3])?;
///
/// for _ in 0..5 {
///     let tick = manager.advance()?;
///     let value = counter.get(tick.previous())?;
///     counter.set(tick.next(), value + 1)?;
///     manager.publish_stable(tick.next())?;
/// }
///
/// assert_eq!(counter.get(manager.current_indices().stable())?, 5);
/// # Ok::<(), cadence_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct StateManager {
    depth: BufferDepth,
    bounds: BoundsCheck,
    indices: TickIndices,
    /// Whether `advance` has been called without a matching publish.
    stepping: bool,
    /// Start of the open step phase.
    step_started: Option<Instant>,
    published: Arc<Published>,
    step_stats: RunningStats,
    notifier: LifecycleNotifier<TickId, RotationEvent>,
}

impl StateManager {
    /// Creates a manager with checked access and the default stats window.
    ///
    /// Slot 0 is stable initially, so initial buffer values at index 0 are
    /// what renderers see before the first publish.
    #[must_use]
    pub fn new(depth: BufferDepth) -> Self {
        let window = NonZeroUsize::new(DEFAULT_STATS_WINDOW).unwrap_or(NonZeroUsize::MIN);
        Self::build(depth, BoundsCheck::Checked, window)
    }

    /// Creates a manager from `buffer_depth`, `bounds_check` and
    /// `stats_window`.
    ///
    /// # Errors
    ///
    /// Returns the error from [`CoreConfig::validate`].
    pub fn from_config(config: &CoreConfig) -> CoreResult<Self> {
        config.validate()?;
        let depth = config.depth()?;
        let window = NonZeroUsize::new(config.stats_window).ok_or(CoreError::InvalidCapacity)?;
        Ok(Self::build(depth, config.bounds_check, window))
    }

    fn build(depth: BufferDepth, bounds: BoundsCheck, window: NonZeroUsize) -> Self {
        Self {
            depth,
            bounds,
            indices: TickIndices::after_publish(0, depth),
            stepping: false,
            step_started: None,
            published: Arc::new(Published {
                stable: AtomicUsize::new(0),
                tick: AtomicU64::new(0),
            }),
            step_stats: RunningStats::with_capacity(window),
            notifier: LifecycleNotifier::new(),
        }
    }

    /// The buffer depth `N`.
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> BufferDepth {
        self.depth
    }

    /// The indexed-access policy given to buffers created here.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> BoundsCheck {
        self.bounds
    }

    /// The index assignment of the open tick, or of the upcoming tick when
    /// no step phase is open.
    #[inline]
    #[must_use]
    pub const fn current_indices(&self) -> TickIndices {
        self.indices
    }

    /// Whether a step phase is open.
    #[inline]
    #[must_use]
    pub const fn is_stepping(&self) -> bool {
        self.stepping
    }

    /// Number of ticks published so far.
    #[inline]
    #[must_use]
    pub fn tick(&self) -> TickId {
        self.published.tick.load(Ordering::Relaxed)
    }

    /// Returns a reader of the stable index for render threads.
    #[must_use]
    pub fn stable_reader(&self) -> StableReader {
        StableReader {
            published: Arc::clone(&self.published),
        }
    }

    /// Step-phase durations in seconds, from `advance` to `publish_stable`.
    #[inline]
    #[must_use]
    pub fn step_stats(&self) -> &RunningStats {
        &self.step_stats
    }

    /// Rotation announcements. The sender is the tick number.
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &LifecycleNotifier<TickId, RotationEvent> {
        &self.notifier
    }

    /// Creates a state buffer sized and policed like every other buffer of
    /// this manager.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SizeMismatch`] unless `values.len() == N`.
    pub fn create_buffer<T>(&self, values: Vec<T>) -> CoreResult<StateBuffer<T>> {
        StateBuffer::with_bounds(self.depth, values, self.bounds)
    }

    /// Creates a state buffer with every slot set to a clone of `value`.
    #[must_use]
    pub fn create_buffer_filled<T: Clone>(&self, value: &T) -> StateBuffer<T> {
        StateBuffer::from_fn(self.depth, self.bounds, |_| value.clone())
    }

    /// Opens the step phase of the next tick and returns its indices.
    ///
    /// Entities read `previous` and write only `next`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RotationConflict`] if the previous tick has not
    /// been published yet.
    pub fn advance(&mut self) -> CoreResult<TickIndices> {
        if self.stepping {
            return Err(CoreError::RotationConflict);
        }
        self.stepping = true;
        self.step_started = Some(Instant::now());

        let indices = self.indices;
        tracing::debug!(
            tick = self.tick() + 1,
            previous = indices.previous,
            next = indices.next,
            stable = indices.stable,
            "advance"
        );
        self.notifier
            .notify(&self.tick(), &mut EventArgs::new(RotationEvent::Advanced(indices)));
        Ok(indices)
    }

    /// Publishes `index` as the new stable state and closes the step phase.
    ///
    /// Call once every entity has finished writing `next`; the join of the
    /// step workers is the barrier that makes their writes visible here.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DoublePublish`] if no step phase is open and
    /// [`CoreError::PublishMismatch`] if `index` is not the tick's `next`.
    pub fn publish_stable(&mut self, index: usize) -> CoreResult<TickIndices> {
        if !self.stepping {
            return Err(CoreError::DoublePublish);
        }
        if index != self.indices.next {
            return Err(CoreError::PublishMismatch {
                expected: self.indices.next,
                actual: index,
            });
        }

        if let Some(started) = self.step_started.take() {
            self.step_stats.add_duration(started.elapsed());
        }

        self.indices = TickIndices::after_publish(index, self.depth);
        self.stepping = false;
        self.published.stable.store(index, Ordering::Release);
        let tick = self.published.tick.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::debug!(tick, stable = index, "publish_stable");
        self.notifier
            .notify(&tick, &mut EventArgs::new(RotationEvent::Published(self.indices)));
        Ok(self.indices)
    }
}
