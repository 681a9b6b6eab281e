//! # Entities
//!
//! An entity owns its [`StateBuffer`](cadence_core::StateBuffer)s and knows
//! how to advance and present them. The loop only hands out indices.

use cadence_core::CoreResult;

/// A simulated object driven by the tick loop.
///
/// `step` runs on a worker thread during the step phase, concurrently with
/// other entities' `step`. It must read only slot `previous` and write only
/// slot `next` of its own buffers. `draw` reads only slot `stable` and may
/// run while the following tick's `step` is in flight.
pub trait Entity: Send + Sync {
    /// Produces this tick's state in `next` from last tick's in `previous`.
    ///
    /// # Errors
    ///
    /// Any error aborts the tick before it is published.
    fn step(&self, previous: usize, next: usize) -> CoreResult<()>;

    /// Presents the published state. `interpolation` is the fraction of a
    /// tick elapsed since it was published, in `[0, 1)`.
    ///
    /// # Errors
    ///
    /// Errors are returned to the caller of
    /// [`TickLoop::render`](crate::TickLoop::render).
    fn draw(&self, stable: usize, interpolation: f32) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{BufferDepth, StateBuffer, StateManager};

    struct Counter {
        value: StateBuffer<u32>,
    }

    impl Entity for Counter {
        fn step(&self, previous: usize, next: usize) -> CoreResult<()> {
            let value = self.value.get(previous)?;
            self.value.set(next, value + 1)
        }

        fn draw(&self, stable: usize, _interpolation: f32) -> CoreResult<()> {
            self.value.get(stable).map(drop)
        }
    }

    #[test]
    fn test_entity_is_object_safe() {
        let mut manager = StateManager::new(BufferDepth::TRIPLE);
        let entity: Box<dyn Entity> = Box::new(Counter {
            value: manager.create_buffer_filled(&0),
        });

        let tick = manager.advance().unwrap();
        entity.step(tick.previous(), tick.next()).unwrap();
        let published = manager.publish_stable(tick.next()).unwrap();
        entity.draw(published.stable(), 0.0).unwrap();
        assert!(entity.step(0, 9).is_err());
    }
}
