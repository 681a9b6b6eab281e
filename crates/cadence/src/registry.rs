//! # Entity Registry
//!
//! Entities live in a dense slot table indexed by their [`Handle`]. A packed
//! "active" flag per slot decides who steps and draws; inactive entities
//! keep their state but are skipped by the loop.
//!
//! ## Lifecycle
//!
//! ```text
//! spawn   -> Spawned
//! despawn -> Despawning (cancellable) -> Despawned
//! ```
//!
//! A subscriber that cancels `Despawning` keeps the entity alive and its
//! handle issued.

use std::ops::Range;
use std::sync::Arc;

use cadence_core::{
    BitFlags, BoundsCheck, CoreConfig, CoreError, EventArgs, Handle, HandleAllocator,
    LifecycleNotifier,
};

use crate::entity::Entity;
use crate::error::LoopResult;

/// Lifecycle events announced by the registry. The sender is the handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityEvent {
    /// The entity was inserted and is active.
    Spawned,
    /// The entity is about to be removed. Cancel to keep it.
    Despawning,
    /// The entity was removed and its handle released.
    Despawned,
}

/// Shared entity slot.
pub type EntityRef = Arc<dyn Entity>;

/// Slot table and active set, shared with step workers for one tick.
///
/// The registry mutates it through [`Arc::make_mut`]; workers drop their
/// reference before reporting, so between ticks the registry is the sole
/// owner and no copy is made.
#[derive(Clone)]
pub(crate) struct EntityTable {
    slots: Vec<Option<EntityRef>>,
    active: BitFlags,
}

impl EntityTable {
    /// Number of slots, live or vacant.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Active entities whose slot index falls in `range`.
    pub(crate) fn active_in(&self, range: Range<usize>) -> impl Iterator<Item = &EntityRef> + '_ {
        self.slots[range.clone()]
            .iter()
            .zip(range)
            .filter(move |(_, index)| self.active.get(*index).unwrap_or(false))
            .filter_map(|(slot, _)| slot.as_ref())
    }
}

/// Handle-indexed table of live entities.
pub struct EntityRegistry {
    handles: HandleAllocator,
    table: Arc<EntityTable>,
    live: usize,
    notifier: LifecycleNotifier<Handle, EntityEvent>,
}

impl EntityRegistry {
    /// Creates an empty registry with room for `capacity` entities.
    ///
    /// The registry takes sole ownership of `handles`; no handle it has
    /// issued can be released behind its back.
    #[must_use]
    pub fn new(handles: HandleAllocator, bounds: BoundsCheck, capacity: usize) -> Self {
        Self {
            handles,
            table: Arc::new(EntityTable {
                slots: Vec::with_capacity(capacity),
                active: BitFlags::with_bounds(0, bounds),
            }),
            live: 0,
            notifier: LifecycleNotifier::new(),
        }
    }

    /// Creates a registry whose handle policy and access checks follow
    /// `config`.
    #[must_use]
    pub fn from_config(config: &CoreConfig, capacity: usize) -> Self {
        Self::new(
            HandleAllocator::from_config(config),
            config.bounds_check,
            capacity,
        )
    }

    /// Inserts an entity as active and announces [`EntityEvent::Spawned`].
    ///
    /// Returns `None` when the handle allocator is exhausted.
    pub fn spawn(&mut self, entity: impl Entity + 'static) -> Option<Handle> {
        self.spawn_shared(Arc::new(entity))
    }

    /// Inserts an already shared entity. See [`EntityRegistry::spawn`].
    pub fn spawn_shared(&mut self, entity: EntityRef) -> Option<Handle> {
        let handle = self.handles.acquire()?;
        let index = handle.index();

        let table = Arc::make_mut(&mut self.table);
        if index >= table.slots.len() {
            table.slots.resize_with(index + 1, || None);
        }
        table.slots[index] = Some(entity);
        table.active.set_or_grow(index, true);
        self.live += 1;

        tracing::debug!(%handle, live = self.live, "entity spawned");
        self.notifier
            .notify(&handle, &mut EventArgs::new(EntityEvent::Spawned));
        Some(handle)
    }

    /// Removes an entity unless a subscriber cancels
    /// [`EntityEvent::Despawning`].
    ///
    /// Returns `Ok(false)` when the despawn was canceled.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StaleHandle`] if `handle` names no entity.
    pub fn despawn(&mut self, handle: Handle) -> LoopResult<bool> {
        self.slot(handle)?;

        let outcome = self
            .notifier
            .notify(&handle, &mut EventArgs::cancellable(EntityEvent::Despawning));
        if outcome.canceled {
            tracing::debug!(%handle, "despawn canceled");
            return Ok(false);
        }

        self.handles.release(handle)?;
        let index = handle.index();
        let table = Arc::make_mut(&mut self.table);
        table.slots[index] = None;
        table.active.set_or_grow(index, false);
        self.live -= 1;

        tracing::debug!(%handle, live = self.live, "entity despawned");
        self.notifier
            .notify(&handle, &mut EventArgs::new(EntityEvent::Despawned));
        Ok(true)
    }

    fn slot(&self, handle: Handle) -> LoopResult<&EntityRef> {
        self.table
            .slots
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| CoreError::StaleHandle(handle.get()).into())
    }

    /// The entity behind `handle`, if it is alive.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&EntityRef> {
        self.slot(handle).ok()
    }

    /// Whether `handle` names a live entity.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Includes or excludes an entity from stepping and drawing.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StaleHandle`] if `handle` names no entity.
    pub fn set_active(&mut self, handle: Handle, active: bool) -> LoopResult<()> {
        self.slot(handle)?;
        Arc::make_mut(&mut self.table).active.set(handle.index(), active)?;
        Ok(())
    }

    /// Whether the entity takes part in ticks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StaleHandle`] if `handle` names no entity.
    pub fn is_active(&self, handle: Handle) -> LoopResult<bool> {
        self.slot(handle)?;
        Ok(self.table.active.get(handle.index())?)
    }

    /// Live entities, active or not.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no entity is alive.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of active entities.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.table.active.count_ones()
    }

    /// The packed active set, one bit per slot.
    #[must_use]
    pub fn active_flags(&self) -> &BitFlags {
        &self.table.active
    }

    /// Iterates active entities in handle order.
    pub fn active(&self) -> impl Iterator<Item = (Handle, &EntityRef)> + '_ {
        self.table
            .slots
            .iter()
            .zip(self.table.active.iter())
            .enumerate()
            .filter_map(|(index, (slot, active))| {
                let entity = slot.as_ref().filter(|_| active)?;
                let handle = Handle::new(u32::try_from(index).ok()?);
                Some((handle, entity))
            })
    }

    /// The table stepped by workers this tick.
    pub(crate) fn table(&self) -> &Arc<EntityTable> {
        &self.table
    }

    /// Handles currently issued. Always equal to [`EntityRegistry::len`].
    #[must_use]
    pub fn handles_acquired(&self) -> usize {
        self.handles.acquired()
    }

    /// Handles still available, or `None` when unbounded.
    #[must_use]
    pub fn handles_remaining(&self) -> Option<u64> {
        self.handles.remaining()
    }

    /// Largest handle value the registry may issue, or `None` when
    /// unbounded.
    #[must_use]
    pub const fn max_handle(&self) -> Option<u32> {
        self.handles.max()
    }

    /// Lifecycle notifier for spawn and despawn.
    #[must_use]
    pub const fn notifier(&self) -> &LifecycleNotifier<Handle, EntityEvent> {
        &self.notifier
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(HandleAllocator::unbounded(), BoundsCheck::Checked, 0)
    }
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("live", &self.live)
            .field("active", &self.table.active.count_ones())
            .field("slots", &self.table.slots.len())
            .finish_non_exhaustive()
    }
}
