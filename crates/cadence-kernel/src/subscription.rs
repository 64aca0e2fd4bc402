//! Drop-based subscription tokens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

type Release = Box<dyn FnOnce() + Send>;

/// Keeps a listener registered for as long as it is alive.
///
/// Dropping the handle, or calling [`unsubscribe`](Self::unsubscribe),
/// removes the listener from the bus that issued it.  Release happens at most
/// once no matter how many times either path runs.  The handle refers back to
/// its bus weakly, so it never keeps the bus alive; if the bus is gone first,
/// releasing is a no-op.
#[must_use = "dropping a SubscriptionHandle unsubscribes immediately"]
pub struct SubscriptionHandle {
    active: AtomicBool,
    release: Mutex<Option<Release>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            active: AtomicBool::new(true),
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Remove the listener.  Returns `true` only for the call that actually
    /// released it; later calls are no-ops.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Give up the handle but keep the listener registered for the rest of
    /// the bus's lifetime.
    pub fn detach(self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}
