use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::Change;
use crate::metrics::{EVENTS_PUBLISHED, SUBSCRIBER_DISCONNECTS};

type Subscribers = HashMap<Uuid, mpsc::Sender<Arc<Change>>>;

/// Fan-out of [`Change`] values to independent subscribers.
///
/// Every subscriber owns a bounded queue. Publishing never waits: a subscriber
/// whose queue is full is disconnected and must resubscribe to catch up.
/// Cloning the bus yields another handle to the same subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    subscribers: Mutex<Subscribers>,
    capacity: usize,
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // A panicking subscriber cannot leave the map half-updated
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `capacity` changes each.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a new subscriber. It sees every change published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();
        self.inner.lock().insert(id, tx);
        debug!(subscriber = %id, "Subscriber registered");

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: Uuid) {
        if self.inner.lock().remove(&id).is_some() {
            debug!(subscriber = %id, "Subscriber removed");
        }
    }

    /// Deliver `change` to every subscriber. Returns how many received it.
    pub fn publish(&self, change: Change) -> usize {
        EVENTS_PUBLISHED
            .with_label_values(&[change.kind.as_str()])
            .inc();

        let change = Arc::new(change);
        let mut subscribers = self.inner.lock();
        let mut delivered = 0;

        subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&change)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = %id, "Subscriber queue full, disconnecting");
                SUBSCRIBER_DISCONNECTS.inc();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        delivered
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Receiving end of a bus subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Arc<Change>>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the subscription was removed (explicitly or for
    /// falling behind) and the queued changes are drained.
    pub async fn recv(&mut self) -> Option<Arc<Change>> {
        self.rx.recv().await
    }

    /// Take the next queued change without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<Change>, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().remove(&self.id);
        }
    }
}
