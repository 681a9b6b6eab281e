//! # Step Workers
//!
//! Long-lived threads that step contiguous ranges of the entity table.
//!
//! ```text
//! run_tick ──job──► [bounded(1)] ──► worker 0 ─┐
//!          ──job──► [bounded(1)] ──► worker 1 ─┼──result──► [bounded(W)] ──► join
//!          ──job──► [bounded(1)] ──► worker 2 ─┘
//! ```
//!
//! Jobs carry a clone of the table's `Arc` and a slot range. A worker drops
//! its clone before reporting, so once every result is in the registry owns
//! the table alone again. Channels are preallocated; a tick sends and
//! receives without allocating.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cadence_core::{CoreResult, TickId, TickIndices};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{LoopError, LoopResult};
use crate::registry::EntityTable;

struct StepJob {
    table: Arc<EntityTable>,
    range: Range<usize>,
    indices: TickIndices,
}

/// Result of one job, `None` if a step panicked.
type StepDone = Option<CoreResult<usize>>;

/// Steps the active entities in `range`, stopping at the first error.
pub(crate) fn step_range(
    table: &EntityTable,
    range: Range<usize>,
    indices: TickIndices,
) -> CoreResult<usize> {
    let mut stepped = 0;
    for entity in table.active_in(range) {
        entity.step(indices.previous(), indices.next())?;
        stepped += 1;
    }
    Ok(stepped)
}

/// Fixed set of step worker threads, started once and joined on drop.
#[derive(Debug)]
pub(crate) struct StepPool {
    jobs: Vec<Sender<StepJob>>,
    done: Receiver<StepDone>,
    threads: Vec<JoinHandle<()>>,
}

impl StepPool {
    /// Starts `workers` threads.
    pub(crate) fn new(workers: usize) -> LoopResult<Self> {
        let workers = workers.max(1);
        let (done_tx, done) = bounded(workers);
        let mut jobs = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);

        for id in 0..workers {
            let (job_tx, job_rx) = bounded(1);
            let done_tx = done_tx.clone();
            let thread = thread::Builder::new()
                .name(format!("cadence-step-{id}"))
                .spawn(move || worker_loop(&job_rx, &done_tx))
                .map_err(|e| LoopError::WorkerSpawn(e.to_string()))?;
            jobs.push(job_tx);
            threads.push(thread);
        }

        tracing::debug!(workers, "step workers started");
        Ok(Self {
            jobs,
            done,
            threads,
        })
    }

    /// Number of worker threads.
    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Steps every active entity of `table` across the workers.
    ///
    /// Returns only after every dispatched job has reported, even when an
    /// earlier one failed.
    pub(crate) fn run(
        &self,
        table: &Arc<EntityTable>,
        indices: TickIndices,
        tick: TickId,
    ) -> LoopResult<usize> {
        let len = table.len();
        let chunk = len.div_ceil(self.jobs.len()).max(1);

        let mut failure = None;
        let mut dispatched = 0;
        for (worker, start) in self.jobs.iter().zip((0..len).step_by(chunk)) {
            let job = StepJob {
                table: Arc::clone(table),
                range: start..(start + chunk).min(len),
                indices,
            };
            if worker.send(job).is_ok() {
                dispatched += 1;
            } else if failure.is_none() {
                failure = Some(LoopError::WorkerPanicked { tick });
            }
        }

        let mut stepped = 0;
        for _ in 0..dispatched {
            let err = match self.done.recv() {
                Ok(Some(Ok(count))) => {
                    stepped += count;
                    continue;
                }
                Ok(Some(Err(err))) => LoopError::from(err),
                Ok(None) | Err(_) => {
                    tracing::error!(tick, "step worker panicked");
                    LoopError::WorkerPanicked { tick }
                }
            };
            if failure.is_none() {
                failure = Some(err);
            }
        }
        failure.map_or(Ok(stepped), Err)
    }
}

impl Drop for StepPool {
    fn drop(&mut self) {
        // Closing the job channels ends every worker loop.
        self.jobs.clear();
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

fn worker_loop(jobs: &Receiver<StepJob>, done: &Sender<StepDone>) {
    while let Ok(StepJob {
        table,
        range,
        indices,
    }) = jobs.recv()
    {
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| step_range(&table, range, indices))).ok();
        drop(table);
        if done.send(result).is_err() {
            break;
        }
    }
}
