//! Integration tests for the rotation protocol and the shared allocators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cadence_core::{
    BufferDepth, CoreConfig, CoreError, Handle, HandleAllocator, Mailbox, RotationEvent,
    StateBuffer, StateManager,
};

#[test]
fn test_counter_reaches_five_after_five_ticks() {
    let mut manager = StateManager::new(BufferDepth::TRIPLE);
    let counter = manager.create_buffer(vec![0u32, 0, 0]).unwrap();

    for _ in 0..5 {
        let tick = manager.advance().unwrap();
        let mut view = counter.step_view(tick).unwrap();
        let value = *view.previous() + 1;
        view.write_next(value);
        drop(view);
        manager.publish_stable(tick.next()).unwrap();
    }

    let stable = manager.current_indices().stable();
    for _ in 0..10 {
        assert_eq!(counter.get(stable).unwrap(), 5);
        assert_eq!(manager.current_indices().stable(), stable);
    }

    // The sixth advance leaves the stable slot untouched until publish.
    let tick = manager.advance().unwrap();
    assert_eq!(tick.stable(), stable);
    assert_ne!(tick.next(), stable);
    assert_eq!(counter.get(stable).unwrap(), 5);
}

#[test]
fn test_parallel_step_phase_with_concurrent_renderer() {
    const ENTITIES: usize = 64;
    const TICKS: u64 = 200;

    let mut manager = StateManager::new(BufferDepth::TRIPLE);
    let buffers: Arc<Vec<StateBuffer<u64>>> = Arc::new(
        (0..ENTITIES)
            .map(|_| manager.create_buffer_filled(&0u64))
            .collect(),
    );
    let reader = manager.stable_reader();
    let done = Arc::new(AtomicBool::new(false));

    // Renderer reads the stable slot for the whole run.
    let renderer = {
        let buffers = Arc::clone(&buffers);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut frames = 0u64;
            while !done.load(Ordering::Acquire) {
                let value = buffers[0].get(reader.stable()).unwrap();
                assert!(value <= TICKS);
                frames += 1;
            }
            frames
        })
    };

    for _ in 0..TICKS {
        let tick = manager.advance().unwrap();
        thread::scope(|scope| {
            for chunk in buffers.chunks(ENTITIES / 4) {
                scope.spawn(move || {
                    for buffer in chunk {
                        let mut view = buffer.step_view(tick).unwrap();
                        let value = *view.previous() + 1;
                        view.write_next(value);
                    }
                });
            }
        });
        manager.publish_stable(tick.next()).unwrap();
    }

    done.store(true, Ordering::Release);
    renderer.join().unwrap();

    let stable = manager.current_indices().stable();
    for buffer in buffers.iter() {
        assert_eq!(buffer.get(stable).unwrap(), TICKS);
    }
    assert_eq!(manager.tick(), TICKS);
}

#[test]
fn test_protocol_misuse_is_reported() {
    let mut manager = StateManager::new(BufferDepth::DOUBLE);
    assert_eq!(manager.publish_stable(1), Err(CoreError::DoublePublish));

    let tick = manager.advance().unwrap();
    assert_eq!(manager.advance(), Err(CoreError::RotationConflict));
    manager.publish_stable(tick.next()).unwrap();
    assert_eq!(manager.publish_stable(tick.next()), Err(CoreError::DoublePublish));
}

#[test]
fn test_concurrent_acquire_release_never_double_issues() {
    let alloc = Arc::new(HandleAllocator::new(None, true));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            thread::spawn(move || {
                let mut held: Vec<Handle> = Vec::new();
                for round in 0..500 {
                    held.push(alloc.acquire().unwrap());
                    if round % 3 == 0 {
                        let h = held.remove(0);
                        alloc.release(h).unwrap();
                    }
                }
                held
            })
        })
        .collect();

    let mut all = HashSet::new();
    let mut total = 0;
    for worker in workers {
        let held = worker.join().unwrap();
        total += held.len();
        all.extend(held);
    }

    assert_eq!(all.len(), total, "a handle was issued twice");
    assert_eq!(alloc.acquired(), total);
}

#[test]
fn test_bounded_allocator_exhausts_exactly_at_max() {
    let config = CoreConfig::from_toml_str("max_handle = 9").unwrap();
    let alloc = HandleAllocator::from_config(&config);

    let minted: Vec<Handle> = (0..10).map(|_| alloc.acquire().unwrap()).collect();
    assert!(minted.iter().all(|h| h.get() <= 9));
    assert_eq!(alloc.acquire(), None);
    assert_eq!(alloc.remaining(), Some(0));
}

#[test]
fn test_rotation_events_delivered_to_owner_thread() {
    let mut manager = StateManager::new(BufferDepth::TRIPLE);
    let mailbox = Mailbox::new();
    let owner = mailbox.owner();
    let published = Arc::new(parking_lot::Mutex::new(Vec::new()));

    {
        let published = Arc::clone(&published);
        manager
            .notifier()
            .subscribe_on(mailbox.address(), move |tick, args| {
                assert_eq!(thread::current().id(), owner);
                if let RotationEvent::Published(_) = args.payload() {
                    published.lock().push(*tick);
                }
            });
    }

    for _ in 0..3 {
        let tick = manager.advance().unwrap();
        manager.publish_stable(tick.next()).unwrap();
    }

    assert!(published.lock().is_empty());
    assert_eq!(mailbox.pump(), 6);
    assert_eq!(*published.lock(), vec![1, 2, 3]);
}
