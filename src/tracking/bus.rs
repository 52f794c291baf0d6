// src/tracking/bus.rs - Snapshot fan-out to observers
//
// Every subscriber gets its own queue drained by a dedicated task, so a slow
// or failing observer can only lose its own snapshots. Queue slots are
// semaphore permits: publishing waits at most `budget` per subscriber for a
// slot, concurrently across subscribers. Terminal snapshots skip the wait and
// are always enqueued.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use super::state::SessionSnapshot;

/// Observer callback. Errors and panics are logged, never propagated.
pub type SnapshotHandler = Arc<dyn Fn(&SessionSnapshot) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// A queued snapshot and the queue slot it occupies, if it got one.
struct Delivery {
    snapshot: SessionSnapshot,
    slot: Option<OwnedSemaphorePermit>,
}

#[derive(Clone)]
struct Subscriber {
    name: String,
    tx: mpsc::UnboundedSender<Delivery>,
    slots: Arc<Semaphore>,
}

impl Subscriber {
    async fn deliver(self, snapshot: SessionSnapshot, budget: Duration) -> bool {
        let slot = if snapshot.status().is_terminal() {
            // Enqueued even when every slot is taken.
            self.slots.clone().try_acquire_owned().ok()
        } else {
            match tokio::time::timeout(budget, self.slots.clone().acquire_owned()).await {
                Ok(Ok(permit)) => Some(permit),
                Ok(Err(_)) => return false,
                Err(_) => {
                    tracing::warn!(
                        "Observer '{}' exceeded the {:?} dispatch budget; snapshot dropped",
                        self.name,
                        budget
                    );
                    return false;
                }
            }
        };

        if self.tx.send(Delivery { snapshot, slot }).is_err() {
            tracing::debug!("Observer '{}' is gone; snapshot not delivered", self.name);
            return false;
        }
        true
    }
}

struct BusInner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    budget: Duration,
    queue: usize,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(budget: Duration, queue: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                budget,
                queue: queue.max(1),
            }),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, Subscriber>> {
        match self.inner.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register an observer. Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, name: &str, handler: F) -> Subscription
    where
        F: Fn(&SessionSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(name.to_string(), Arc::new(handler), rx));

        self.subscribers().insert(
            id,
            Subscriber {
                name: name.to_string(),
                tx,
                slots: Arc::new(Semaphore::new(self.inner.queue)),
            },
        );
        tracing::debug!("Observer '{}' subscribed (#{})", name, id);
        Subscription(id)
    }

    /// Remove an observer. Snapshots already queued for it are still
    /// delivered. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        match self.subscribers().remove(&subscription.0) {
            Some(sub) => {
                tracing::debug!("Observer '{}' unsubscribed (#{})", sub.name, subscription.0);
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Deliver `snapshot` to every current subscriber. Returns how many
    /// queues accepted it.
    ///
    /// Non-terminal snapshots are dropped for a subscriber whose queue stays
    /// full for longer than the dispatch budget. `Stopped` and `Failed` are
    /// never dropped for a live subscriber.
    pub async fn publish(&self, snapshot: &SessionSnapshot) -> usize {
        let targets: Vec<Subscriber> = self.subscribers().values().cloned().collect();

        if targets.is_empty() {
            return 0;
        }

        let budget = self.inner.budget;
        let sends = targets
            .into_iter()
            .map(|sub| sub.deliver(snapshot.clone(), budget));

        futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }
}

async fn dispatch(
    name: String,
    handler: SnapshotHandler,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(Delivery { snapshot, slot }) = rx.recv().await {
        // Picked up: the queue slot frees while the handler runs.
        drop(slot);
        match std::panic::catch_unwind(AssertUnwindSafe(|| (*handler)(&snapshot))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Observer '{}' failed on {} snapshot: {}", name, snapshot.status(), e);
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                tracing::error!("Observer '{}' panicked: {}", name, msg);
            }
        }
    }
    tracing::trace!("Observer '{}' dispatcher finished", name);
}
