//! # Running Statistics
//!
//! Fixed-capacity ring of measurements with running average, minimum and
//! maximum. Used to monitor tick timing and to drive adaptive pacing.
//!
//! ## Extremes are historical
//!
//! The average covers only the measurements currently in the window. The
//! minimum and maximum do not: they are updated by two independent
//! comparisons on insertion and are never recomputed when the extreme value
//! is overwritten. They report the extremes of everything inserted since
//! construction or the last [`RunningStats::reset`].

use std::num::NonZeroUsize;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{CoreError, CoreResult};

/// Consistent view of a [`RunningStats`] taken under one lock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatsSnapshot {
    /// Measurements currently in the window.
    pub count: usize,
    /// Window capacity.
    pub capacity: usize,
    /// Mean of the windowed measurements.
    pub average: Option<f64>,
    /// Smallest measurement ever inserted.
    pub minimum: Option<f64>,
    /// Largest measurement ever inserted.
    pub maximum: Option<f64>,
    /// Most recent measurement.
    pub last: Option<f64>,
}

#[derive(Debug)]
struct Window {
    samples: Box<[f64]>,
    /// Next write position.
    position: usize,
    count: usize,
    minimum: f64,
    maximum: f64,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            position: 0,
            count: 0,
            minimum: f64::INFINITY,
            maximum: f64::NEG_INFINITY,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        // Live samples are the first `count` slots until the ring wraps,
        // then all of them.
        let sum: f64 = self.samples[..self.count].iter().sum();
        Some(sum / self.count as f64)
    }

    fn minimum(&self) -> Option<f64> {
        (self.count > 0).then_some(self.minimum)
    }

    fn maximum(&self) -> Option<f64> {
        (self.count > 0).then_some(self.maximum)
    }

    fn last(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.samples.len();
        Some(self.samples[(self.position + capacity - 1) % capacity])
    }
}

/// Thread-safe running statistics over the most recent `capacity`
/// measurements.
///
/// Every read and write takes the same lock, so a monitoring thread may read
/// while a worker inserts and always sees a linearizable result.
///
/// # Example
///
/// ```rust
/// use cadence_core::RunningStats;
///
/// let stats = RunningStats::new(2)?;
/// stats.add_measurement(1.0);
/// stats.add_measurement(3.0);
/// stats.add_measurement(5.0);
///
/// assert_eq!(stats.count(), 2);
/// assert_eq!(stats.average(), Some(4.0));
/// assert_eq!(stats.minimum(), Some(1.0)); // historical, not evicted
/// # Ok::<(), cadence_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct RunningStats {
    window: Mutex<Window>,
}

impl RunningStats {
    /// Creates an empty window holding up to `capacity` measurements.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> CoreResult<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity);
        }
        Ok(Self {
            window: Mutex::new(Window::new(capacity)),
        })
    }

    /// Creates an empty window from an already-validated capacity.
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            window: Mutex::new(Window::new(capacity.get())),
        }
    }

    /// Inserts a measurement, overwriting the oldest once the window is full.
    pub fn add_measurement(&self, value: f64) {
        let mut window = self.window.lock();
        let capacity = window.samples.len();

        let position = window.position;
        window.samples[position] = value;
        window.position = (position + 1) % capacity;
        if window.count < capacity {
            window.count += 1;
        }

        if value > window.maximum {
            window.maximum = value;
        }
        if value < window.minimum {
            window.minimum = value;
        }
    }

    /// Inserts a duration measured in seconds.
    pub fn add_duration(&self, elapsed: Duration) {
        self.add_measurement(elapsed.as_secs_f64());
    }

    /// Number of measurements in the window, at most `capacity`.
    #[must_use]
    pub fn count(&self) -> usize {
        self.window.lock().count
    }

    /// Window capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.window.lock().samples.len()
    }

    /// Mean of the windowed measurements, `None` when empty.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        self.window.lock().average()
    }

    /// Smallest measurement inserted since the last reset.
    #[must_use]
    pub fn minimum(&self) -> Option<f64> {
        self.window.lock().minimum()
    }

    /// Largest measurement inserted since the last reset.
    #[must_use]
    pub fn maximum(&self) -> Option<f64> {
        self.window.lock().maximum()
    }

    /// Most recent measurement.
    #[must_use]
    pub fn last(&self) -> Option<f64> {
        self.window.lock().last()
    }

    /// Reads every statistic under a single lock.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let window = self.window.lock();
        StatsSnapshot {
            count: window.count,
            capacity: window.samples.len(),
            average: window.average(),
            minimum: window.minimum(),
            maximum: window.maximum(),
            last: window.last(),
        }
    }

    /// Discards every measurement and both extremes.
    pub fn reset(&self) {
        let mut window = self.window.lock();
        let capacity = window.samples.len();
        *window = Window::new(capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_empty_window() {
        let stats = RunningStats::new(4).unwrap();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.average(), None);
        assert_eq!(stats.minimum(), None);
        assert_eq!(stats.maximum(), None);
        assert_eq!(stats.last(), None);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(RunningStats::new(0).unwrap_err(), CoreError::InvalidCapacity);
    }

    #[test]
    fn test_average_before_wrap() {
        let stats = RunningStats::new(4).unwrap();
        stats.add_measurement(2.0);
        stats.add_measurement(4.0);
        assert_eq!(stats.count(), 2);
        assert_eq!(stats.average(), Some(3.0));
        assert_eq!(stats.last(), Some(4.0));
    }

    #[test]
    fn test_wraparound_evicts_oldest_from_average() {
        let stats = RunningStats::new(3).unwrap();
        // v0..v3, capacity 3
        for v in [100.0, 1.0, 2.0, 3.0] {
            stats.add_measurement(v);
        }
        assert_eq!(stats.count(), 3);
        assert_eq!(stats.average(), Some(2.0));
        assert_eq!(stats.last(), Some(3.0));
    }

    #[test]
    fn test_extremes_are_not_retroactive() {
        let stats = RunningStats::new(3).unwrap();
        for v in [100.0, 1.0, 2.0, 3.0, -5.0, 4.0, 5.0, 6.0] {
            stats.add_measurement(v);
        }
        // Window now holds 4, 5, 6 but the extremes remember 100 and -5.
        assert_eq!(stats.average(), Some(5.0));
        assert_eq!(stats.maximum(), Some(100.0));
        assert_eq!(stats.minimum(), Some(-5.0));
    }

    #[test]
    fn test_first_measurement_seeds_both_extremes() {
        let stats = RunningStats::new(2).unwrap();
        stats.add_measurement(7.5);
        assert_eq!(stats.minimum(), Some(7.5));
        assert_eq!(stats.maximum(), Some(7.5));
    }

    #[test]
    fn test_reset() {
        let stats = RunningStats::new(2).unwrap();
        stats.add_measurement(1.0);
        stats.reset();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.maximum(), None);
        assert_eq!(stats.capacity(), 2);
    }

    #[test]
    fn test_duration_in_seconds() {
        let stats = RunningStats::new(2).unwrap();
        stats.add_duration(Duration::from_millis(250));
        assert_eq!(stats.last(), Some(0.25));
    }

    #[test]
    fn test_snapshot() {
        let stats = RunningStats::new(8).unwrap();
        stats.add_measurement(1.0);
        stats.add_measurement(3.0);
        let snap = stats.snapshot();
        assert_eq!(snap.count, 2);
        assert_eq!(snap.capacity, 8);
        assert_eq!(snap.average, Some(2.0));
        assert_eq!(snap.minimum, Some(1.0));
        assert_eq!(snap.maximum, Some(3.0));
        assert_eq!(snap.last, Some(3.0));
    }

    #[test]
    fn test_concurrent_writers_and_reader() {
        let stats = Arc::new(RunningStats::new(64).unwrap());

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add_measurement(1.0);
                    }
                })
            })
            .collect();

        let reader = {
            let stats = Arc::clone(&stats);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let snap = stats.snapshot();
                    assert!(snap.count <= snap.capacity);
                    if let Some(avg) = snap.average {
                        assert_eq!(avg, 1.0);
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        assert_eq!(stats.count(), 64);
        assert_eq!(stats.average(), Some(1.0));
    }
}
