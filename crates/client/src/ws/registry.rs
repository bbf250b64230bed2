//! Observer registry for inbound push events.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use pastewatch_shared::ScanEvent;
use parking_lot::Mutex;

/// A registered push event handler.
///
/// Returning `Err` (or panicking) is logged and does not affect delivery to
/// other handlers.
pub type EventHandler = dyn Fn(&ScanEvent) -> anyhow::Result<()> + Send + Sync;

struct Entry {
    handler: Arc<EventHandler>,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<u64, Entry>>,
}

impl SubscriberRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler`. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&ScanEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().insert(
            id,
            Entry {
                handler: Arc::new(handler),
                active: Arc::new(AtomicBool::new(true)),
            },
        );
        tracing::debug!(subscription = id, "handler subscribed");
        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        if let Some(entry) = self.handlers.lock().remove(&id) {
            entry.active.store(false, Ordering::SeqCst);
            tracing::debug!(subscription = id, "handler unsubscribed");
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every live handler. Returns how many handlers
    /// completed without error.
    pub fn dispatch(&self, event: &ScanEvent) -> usize {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let snapshot: Vec<(u64, Arc<EventHandler>, Arc<AtomicBool>)> = self
            .handlers
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.handler.clone(), e.active.clone()))
            .collect();

        let mut delivered = 0;
        for (id, handler, active) in snapshot {
            if !active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::error!(subscription = id, event = event.kind(), error = %e, "event handler failed");
                }
                Err(_) => {
                    tracing::error!(subscription = id, event = event.kind(), "event handler panicked");
                }
            }
        }
        delivered
    }
}

/// Handle for one registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
