//! # Lifecycle Notifier
//!
//! Multi-subscriber dispatch for lifecycle events (buffer rotation, entity
//! spawn and despawn) with early termination and thread-affine delivery.
//!
//! Subscribers are called in subscription order. Inline subscribers run on
//! the notifying thread; queued subscribers are posted to the
//! [`Mailbox`](super::Mailbox) of their owner thread and run when that thread
//! pumps it. If the arguments are cancellable and an inline subscriber
//! cancels them, no later subscriber of either kind is reached.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::mailbox::MailboxAddress;
use crate::error::{CoreError, CoreResult};

/// Payload of a notification plus its cancellation state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventArgs<E> {
    payload: E,
    cancellable: bool,
    canceled: bool,
}

impl<E> EventArgs<E> {
    /// Wraps a payload that cannot be canceled.
    #[must_use]
    pub const fn new(payload: E) -> Self {
        Self {
            payload,
            cancellable: false,
            canceled: false,
        }
    }

    /// Wraps a payload that subscribers may cancel.
    #[must_use]
    pub const fn cancellable(payload: E) -> Self {
        Self {
            payload,
            cancellable: true,
            canceled: false,
        }
    }

    /// The event payload.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &E {
        &self.payload
    }

    /// Consumes the arguments, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Whether subscribers may cancel this event.
    #[inline]
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Whether a subscriber has canceled this event.
    #[inline]
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Requests cancellation. Returns false, and changes nothing, when the
    /// event is not cancellable.
    pub fn cancel(&mut self) -> bool {
        if self.cancellable {
            self.canceled = true;
        }
        self.cancellable
    }
}

/// Identifies a subscription for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What a call to [`LifecycleNotifier::notify`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// Subscribers called inline.
    pub invoked: usize,
    /// Deliveries posted to owner-thread mailboxes.
    pub queued: usize,
    /// Deliveries lost because a mailbox was full or gone.
    pub dropped: usize,
    /// Whether delivery stopped because the event was canceled.
    pub canceled: bool,
}

type Handler<S, E> = Arc<dyn Fn(&S, &mut EventArgs<E>) + Send + Sync + 'static>;

/// Where a subscriber runs.
#[derive(Clone)]
enum Route {
    /// On the notifying thread, synchronously.
    Inline,
    /// On the mailbox owner's thread, asynchronously.
    Queued(MailboxAddress),
}

struct Subscriber<S, E> {
    id: SubscriptionId,
    route: Route,
    handler: Handler<S, E>,
}

impl<S, E> Clone for Subscriber<S, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            route: self.route.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Cancellable, thread-affinity-aware event dispatch.
///
/// `S` identifies the sender of an event, `E` is the payload. Both are
/// cloned for queued deliveries.
///
/// # Example
///
/// ```rust
/// use cadence_core::{EventArgs, LifecycleNotifier};
///
/// let notifier: LifecycleNotifier<&'static str, u32> = LifecycleNotifier::new();
/// notifier.subscribe(|_, args| { args.cancel(); });
/// notifier.subscribe(|_, _| unreachable!("canceled before this subscriber"));
///
/// let mut args = EventArgs::cancellable(7);
/// let outcome = notifier.notify(&"buffers", &mut args);
/// assert!(outcome.canceled);
/// assert_eq!(outcome.invoked, 1);
/// ```
pub struct LifecycleNotifier<S, E> {
    /// Replaced whole on every change; `notify` iterates a shared snapshot.
    subscribers: RwLock<Arc<[Subscriber<S, E>]>>,
    next_id: AtomicU64,
}

impl<S, E> LifecycleNotifier<S, E>
where
    S: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Arc::from(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribes a handler that runs inline on the notifying thread.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&S, &mut EventArgs<E>) + Send + Sync + 'static,
    {
        self.insert(Route::Inline, Arc::new(handler))
    }

    /// Subscribes a handler that runs on the thread owning `mailbox`.
    ///
    /// The handler receives its own copy of the arguments; cancelling that
    /// copy does not affect delivery to other subscribers.
    pub fn subscribe_on<F>(&self, mailbox: MailboxAddress, handler: F) -> SubscriptionId
    where
        F: Fn(&S, &mut EventArgs<E>) + Send + Sync + 'static,
    {
        self.insert(Route::Queued(mailbox), Arc::new(handler))
    }

    fn insert(&self, route: Route, handler: Handler<S, E>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscribers = self.subscribers.write();
        let mut next = subscribers.to_vec();
        next.push(Subscriber { id, route, handler });
        *subscribers = next.into();
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        if !subscribers.iter().any(|s| s.id == id) {
            return false;
        }
        let next: Vec<_> = subscribers.iter().filter(|s| s.id != id).cloned().collect();
        *subscribers = next.into();
        true
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns true if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Delivers `args` to every subscriber in subscription order.
    ///
    /// Stops as soon as `args` is canceled. Subscribers added or removed by
    /// a handler take effect from the next notification.
    pub fn notify(&self, sender: &S, args: &mut EventArgs<E>) -> NotifyOutcome {
        // Handlers may subscribe or unsubscribe; never call them under the lock.
        let subscribers = Arc::clone(&*self.subscribers.read());
        let mut outcome = NotifyOutcome::default();

        for subscriber in subscribers.iter() {
            if args.is_canceled() {
                outcome.canceled = true;
                break;
            }

            match &subscriber.route {
                Route::Inline => {
                    (subscriber.handler)(sender, args);
                    outcome.invoked += 1;
                }
                Route::Queued(mailbox) => {
                    let handler = Arc::clone(&subscriber.handler);
                    let sender = sender.clone();
                    let mut queued_args = args.clone();
                    let posted = mailbox.post(Box::new(move || {
                        handler(&sender, &mut queued_args);
                    }));
                    if posted {
                        outcome.queued += 1;
                    } else {
                        outcome.dropped += 1;
                        tracing::warn!(
                            subscription = subscriber.id.0,
                            "lifecycle delivery dropped: mailbox full or closed"
                        );
                    }
                }
            }
        }

        if args.is_canceled() {
            outcome.canceled = true;
        }

        tracing::trace!(
            invoked = outcome.invoked,
            queued = outcome.queued,
            canceled = outcome.canceled,
            "lifecycle notification delivered"
        );
        outcome
    }

    /// Delivers optional arguments.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NullArguments`] if `args` is `None`.
    pub fn try_notify(
        &self,
        sender: &S,
        args: Option<&mut EventArgs<E>>,
    ) -> CoreResult<NotifyOutcome> {
        let args = args.ok_or(CoreError::NullArguments)?;
        Ok(self.notify(sender, args))
    }
}

impl<S, E> Default for LifecycleNotifier<S, E>
where
    S: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> fmt::Debug for LifecycleNotifier<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleNotifier")
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}
