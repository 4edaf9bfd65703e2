use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tracks whether a notification subscription is active on a session.
///
/// The dispatcher claims the slot before spawning delivery and the guard
/// travels with the delivery task, so the slot frees itself however the
/// task ends.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionSlot {
    active: Arc<AtomicBool>,
}

impl SubscriptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns `None` when another subscription already holds the slot.
    pub fn try_claim(&self) -> Option<SubscriptionGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SubscriptionGuard {
                active: Arc::clone(&self.active),
            })
    }
}

#[derive(Debug)]
pub struct SubscriptionGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}
