//! Cancellation handles.

use std::fmt;
use std::sync::{Mutex, PoisonError};

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle to a live subscription.
///
/// Dropping the handle cancels the subscription. Call [`Subscription::detach`]
/// to keep it running for the rest of the process.
///
/// Handles are `Send + Sync`, so they can sit in shared registries; the
/// teardown only needs to be `Send`.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    teardown: Mutex<Option<Teardown>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Combine several handles into one that cancels them all.
    pub fn all(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || drop(subscriptions))
    }

    pub fn unsubscribe(self) {
        drop(self)
    }

    /// Forget the handle without cancelling.
    pub fn detach(mut self) {
        self.slot().take();
    }

    fn slot(&mut self) -> &mut Option<Teardown> {
        self.teardown.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.slot().take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field(
                "active",
                &self
                    .teardown
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_some(),
            )
            .finish()
    }
}
