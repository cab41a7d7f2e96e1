//! Fan-out of inbound messages to subscribers.
//!
//! Every non-heartbeat message reaches every current subscriber exactly once,
//! in arrival order. A subscriber that joins late is immediately handed the
//! most recent message. Delivery happens outside the registration lock, so a
//! listener may subscribe or unsubscribe from inside its own callback.

use std::sync::{Arc, Weak};

use banter_core::InboundMessage;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::mpsc;

type Listener = Arc<dyn Fn(&Arc<InboundMessage>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    listeners: Vec<(u64, Listener)>,
    latest: Option<Arc<InboundMessage>>,
    next_id: u64,
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
    // Serializes deliveries so replay and live messages never interleave.
    delivery: ReentrantMutex<()>,
}

/// Subscriber list plus the last delivered message.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. If a message was already delivered, the listener
    /// receives it before this call returns.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<InboundMessage>) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let _delivery = self.shared.delivery.lock();
        let (id, latest) = {
            let mut registry = self.shared.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, Arc::clone(&listener)));
            (id, registry.latest.clone())
        };
        if let Some(message) = latest {
            listener(&message);
        }
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Register a channel-backed listener.
    pub fn subscribe_channel(
        &self,
    ) -> (Subscription, mpsc::UnboundedReceiver<Arc<InboundMessage>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |message| {
            let _ = tx.send(Arc::clone(message));
        });
        (subscription, rx)
    }

    /// Deliver a message to every current listener.
    pub fn dispatch(&self, message: InboundMessage) {
        let message = Arc::new(message);
        let _delivery = self.shared.delivery.lock();
        let listeners: Vec<Listener> = {
            let mut registry = self.shared.registry.lock();
            registry.latest = Some(Arc::clone(&message));
            registry
                .listeners
                .iter()
                .map(|(_, l)| Arc::clone(l))
                .collect()
        };
        for listener in listeners {
            listener(&message);
        }
    }

    /// The most recently delivered message.
    pub fn latest(&self) -> Option<Arc<InboundMessage>> {
        self.shared.registry.lock().latest.clone()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.registry.lock().listeners.len()
    }
}

/// Handle to a registered listener. Dropping it unsubscribes.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .registry
                .lock()
                .listeners
                .retain(|(id, _)| *id != self.id);
        }
    }
}
