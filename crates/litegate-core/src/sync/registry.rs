//! Per-connection subscription bookkeeping.
//!
//! The registry is a mapping from subscriber id to a bounded delivery queue,
//! with attach and detach as the only mutators. The broadcast step iterates a
//! copy of the current subscriber list, so a detach racing a broadcast can never
//! corrupt iteration. Delivery never blocks: a subscriber whose queue is full is
//! detached with a warning — its queue closing is the signal — and a subscriber
//! whose receiving side is gone is pruned silently. Neither case affects any
//! other subscriber or the tracker.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::ChainHead;

type SubscriberId = u64;

struct RegistryInner {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<SubscriberId, mpsc::Sender<Arc<ChainHead>>>>,
}

impl RegistryInner {
    fn detach(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber detached");
        }
        removed
    }
}

/// Registry of live head-change subscribers.
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
    buffer: usize,
}

impl SubscriptionRegistry {
    /// Creates a registry whose subscribers each buffer up to `buffer` undelivered
    /// events before being dropped as too slow.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(BTreeMap::new()),
            }),
            buffer: buffer.max(1),
        }
    }

    /// Attaches a new subscriber.
    ///
    /// `initial` is evaluated under the registry lock the broadcast step also
    /// takes, and its result (the current snapshot, if any) becomes the
    /// subscriber's first queued event. Because [`broadcast_with`] installs the
    /// snapshot and captures the subscriber list under that same lock, a late
    /// joiner sees a head exactly once: either as its initial delivery or as the
    /// broadcast it raced with — never neither, never both.
    ///
    /// [`broadcast_with`]: Self::broadcast_with
    pub fn attach(&self, initial: impl FnOnce() -> Option<Arc<ChainHead>>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut subscribers = self.inner.subscribers.lock();
        if let Some(head) = initial() {
            // The channel is fresh and capacity is at least 1; this cannot fail.
            let _ = tx.try_send(head);
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.insert(id, tx);
        drop(subscribers);

        debug!(subscriber = id, "subscriber attached");
        Subscription { id, registry: Arc::downgrade(&self.inner), rx }
    }

    /// Detaches a subscriber by id. Detaching an unknown or already-detached id
    /// is a no-op.
    pub fn detach(&self, id: SubscriberId) -> bool {
        self.inner.detach(id)
    }

    /// Delivers one event to every live subscriber, in registration order.
    ///
    /// Iterates a snapshot of the subscriber list taken under the lock, then
    /// delivers outside it with `try_send` so no subscriber can stall the
    /// caller. Subscribers that cannot accept the event are removed afterwards.
    pub fn broadcast(&self, head: &Arc<ChainHead>) {
        self.broadcast_with(head, || {});
    }

    /// Like [`broadcast`](Self::broadcast), but runs `install` under the
    /// registry lock just before the subscriber list is captured.
    ///
    /// The tracker installs its snapshot there, making the store→broadcast
    /// sequence mutually exclusive with [`attach`](Self::attach)'s
    /// snapshot-read: a subscriber attaching concurrently is either included in
    /// this delivery or already seeded with the installed head, not both.
    pub fn broadcast_with(&self, head: &Arc<ChainHead>, install: impl FnOnce()) {
        let targets: Vec<(SubscriberId, mpsc::Sender<Arc<ChainHead>>)> = {
            let subscribers = self.inner.subscribers.lock();
            install();
            subscribers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut stale = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(head)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = id, "subscriber cannot keep up, dropping it");
                    stale.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    stale.push(id);
                }
            }
        }

        if !stale.is_empty() {
            let mut subscribers = self.inner.subscribers.lock();
            for id in stale {
                subscribers.remove(&id);
            }
        }
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Returns `true` when no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live subscriber's handle: consume events with [`recv`](Self::recv), detach
/// explicitly or by dropping.
///
/// Detaching is idempotent; dropping after an explicit
/// [`unsubscribe`](Self::unsubscribe) is a no-op.
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<RegistryInner>,
    rx: mpsc::Receiver<Arc<ChainHead>>,
}

impl Subscription {
    /// Returns this subscriber's registry id.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Awaits the next event. Returns `None` once the subscription is detached
    /// (including being dropped by the registry for falling behind) and the
    /// queue has drained.
    pub async fn recv(&mut self) -> Option<Arc<ChainHead>> {
        self.rx.recv().await
    }

    /// Returns the next already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<ChainHead>> {
        self.rx.try_recv().ok()
    }

    /// Detaches this subscriber. Returns `false` when it was already detached.
    pub fn unsubscribe(&self) -> bool {
        self.registry.upgrade().is_some_and(|inner| inner.detach(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(seqno: u32) -> Arc<ChainHead> {
        Arc::new(ChainHead {
            workchain: -1,
            shard: "-9223372036854775808".to_string(),
            seqno,
            root_hash: "cm9vdA==".to_string(),
            file_hash: "ZmlsZQ==".to_string(),
            gen_utime: 0,
        })
    }

    #[tokio::test]
    async fn test_attach_delivers_initial_snapshot_first() {
        let registry = SubscriptionRegistry::new(8);
        let snapshot = head(9);

        let mut sub = registry.attach(|| Some(Arc::clone(&snapshot)));
        registry.broadcast(&head(10));

        assert_eq!(sub.recv().await.unwrap().seqno, 9);
        assert_eq!(sub.recv().await.unwrap().seqno, 10);
    }

    #[tokio::test]
    async fn test_attach_without_snapshot_queues_nothing() {
        let registry = SubscriptionRegistry::new(8);
        let mut sub = registry.attach(|| None);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_events_arrive_in_broadcast_order() {
        let registry = SubscriptionRegistry::new(8);
        let mut sub = registry.attach(|| None);

        for seqno in [5, 7, 9] {
            registry.broadcast(&head(seqno));
        }

        assert_eq!(sub.recv().await.unwrap().seqno, 5);
        assert_eq!(sub.recv().await.unwrap().seqno, 7);
        assert_eq!(sub.recv().await.unwrap().seqno, 9);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let registry = SubscriptionRegistry::new(8);
        let keep = registry.attach(|| None);
        let gone = registry.attach(|| None);
        assert_eq!(registry.len(), 2);

        assert!(gone.unsubscribe());
        assert!(!gone.unsubscribe());
        // Detaching an id that was never attached is also a no-op.
        assert!(!registry.detach(999));

        assert_eq!(registry.len(), 1);
        drop(keep);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let registry = SubscriptionRegistry::new(8);
        let subs: Vec<_> = (0..10).map(|_| registry.attach(|| None)).collect();
        assert_eq!(registry.len(), 10);

        // Interleave explicit unsubscribe with plain drops.
        for (i, sub) in subs.into_iter().enumerate() {
            if i % 2 == 0 {
                sub.unsubscribe();
            }
            drop(sub);
        }
        assert_eq!(registry.len(), 0);

        // A subsequent broadcast delivers to nobody and does not panic.
        registry.broadcast(&head(11));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped_without_affecting_others() {
        let registry = SubscriptionRegistry::new(1);
        let mut slow = registry.attach(|| None);
        let mut live = registry.attach(|| None);

        // First event fills the slow subscriber's single-slot queue; the live
        // subscriber keeps consuming.
        registry.broadcast(&head(1));
        assert_eq!(live.recv().await.unwrap().seqno, 1);

        // Second event cannot be queued for the slow one; the registry drops it.
        registry.broadcast(&head(2));
        assert_eq!(live.recv().await.unwrap().seqno, 2);

        assert_eq!(registry.len(), 1);

        // The slow one drains its queue and then observes end-of-stream.
        assert_eq!(slow.recv().await.unwrap().seqno, 1);
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned_and_isolated() {
        let registry = SubscriptionRegistry::new(8);
        let mut live = registry.attach(|| None);

        // A subscriber whose transport died without detaching: its receiver is
        // gone but the sender is still registered.
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        registry.inner.subscribers.lock().insert(999, tx);
        assert_eq!(registry.len(), 2);

        registry.broadcast(&head(5));

        // Delivery to the dead subscriber failed silently; the live one got it.
        assert_eq!(live.recv().await.unwrap().seqno, 5);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_survives_registry_drop() {
        let registry = SubscriptionRegistry::new(8);
        let sub = registry.attach(|| None);
        drop(registry);
        // The weak reference is dead; unsubscribing is a harmless no-op.
        assert!(!sub.unsubscribe());
    }
}
