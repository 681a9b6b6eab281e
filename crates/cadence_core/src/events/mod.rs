//! # Lifecycle Events
//!
//! Announces resource and buffer lifecycle transitions across thread
//! boundaries.
//!
//! ## Delivery Modes
//!
//! ```text
//! Inline:  notify() ──► handler()            (notifying thread, synchronous)
//! Queued:  notify() ──► Mailbox ──► pump() ──► handler()   (owner thread)
//! ```

mod mailbox;
mod notifier;

pub use mailbox::{Mailbox, MailboxAddress};
pub use notifier::{EventArgs, LifecycleNotifier, NotifyOutcome, SubscriptionId};
