//! # Owner-Thread Mailbox
//!
//! A task queue drained by exactly one thread. Subscribers with thread
//! affinity are delivered through a mailbox instead of being called inline
//! by the notifying thread.
//!
//! ```text
//! Notifier thread                  Owner thread
//!   notify() ──post(task)──► [ channel ] ──pump()──► handler(sender, args)
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};

/// A deferred delivery.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Task queue bound to the thread that created it.
///
/// `Mailbox` is neither `Send` nor `Sync`: it stays on its owner thread, so
/// every task it runs executes there. Other threads post through a
/// [`MailboxAddress`].
pub struct Mailbox {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    owner: ThreadId,
    /// Pins the mailbox to its owner thread.
    _not_send: PhantomData<*const ()>,
}

impl Mailbox {
    /// Creates an unbounded mailbox owned by the current thread.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self::from_channel(sender, receiver)
    }

    /// Creates a mailbox holding at most `capacity` pending deliveries.
    ///
    /// Posts to a full mailbox are dropped and reported by the notifier.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self::from_channel(sender, receiver)
    }

    fn from_channel(sender: Sender<Task>, receiver: Receiver<Task>) -> Self {
        Self {
            sender,
            receiver,
            owner: thread::current().id(),
            _not_send: PhantomData,
        }
    }

    /// The thread that drains this mailbox.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Returns a sendable address other threads can post to.
    #[must_use]
    pub fn address(&self) -> MailboxAddress {
        MailboxAddress {
            sender: self.sender.clone(),
            owner: self.owner,
        }
    }

    /// Number of deliveries waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs every queued delivery on this thread and returns how many ran.
    pub fn pump(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.receiver.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Waits up to `timeout` for a delivery, then drains the queue.
    ///
    /// Returns the number of deliveries run; zero means the wait timed out.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("owner", &self.owner)
            .field("pending", &self.receiver.len())
            .finish()
    }
}

/// Sendable handle for posting work to a [`Mailbox`].
#[derive(Clone)]
pub struct MailboxAddress {
    sender: Sender<Task>,
    owner: ThreadId,
}

impl MailboxAddress {
    /// The thread that will run posted deliveries.
    #[inline]
    #[must_use]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Queues `task`. Returns false if the mailbox is full.
    pub(crate) fn post(&self, task: Task) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

impl fmt::Debug for MailboxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxAddress")
            .field("owner", &self.owner)
            .finish()
    }
}
