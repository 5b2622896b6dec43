//! The block synchronization tracker.
//!
//! One `BlockSync` exists per process. It polls the engine pool for the latest
//! masterchain head on a fixed interval and maintains the newest snapshot plus a
//! stream of change events. There is no error state: a failed poll leaves the
//! last snapshot in place and the next cycle retries.

use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{sync::broadcast, time::interval};
use tracing::{debug, info, warn};

use crate::{engine::EngineError, types::ChainHead};

use super::registry::{Subscription, SubscriptionRegistry};

/// Where the tracker reads the current head from.
///
/// Implemented by the pooled [`Client`](crate::engine::Client) in production;
/// tests script head sequences through it.
#[async_trait]
pub trait HeadSource: Send + Sync {
    /// Fetches the latest known masterchain head.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] when no upstream could answer.
    async fn latest_head(&self) -> Result<ChainHead, EngineError>;
}

/// Tracks the chain head and fans out change events.
///
/// The snapshot is replaced wholesale on every accepted advance, never mutated
/// in place, so any number of concurrent readers observe complete values. The
/// tracker is the snapshot's only writer.
pub struct BlockSync {
    source: Arc<dyn HeadSource>,
    registry: SubscriptionRegistry,
    current: ArcSwapOption<ChainHead>,
    /// Serializes the observe step; readers never take it.
    write_guard: Mutex<()>,
    poll_interval: Duration,
}

impl BlockSync {
    /// Creates a tracker polling `source` every `poll_interval`, with
    /// `subscriber_buffer` queued events allowed per subscriber.
    #[must_use]
    pub fn new(
        source: Arc<dyn HeadSource>,
        poll_interval: Duration,
        subscriber_buffer: usize,
    ) -> Self {
        Self {
            source,
            registry: SubscriptionRegistry::new(subscriber_buffer),
            current: ArcSwapOption::const_empty(),
            write_guard: Mutex::new(()),
            poll_interval,
        }
    }

    /// Returns the latest snapshot, or `None` before the first successful poll.
    ///
    /// Lock-free; safe to call from any number of readers at any time.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ChainHead>> {
        self.current.load_full()
    }

    /// Attaches a subscriber that first receives the current snapshot (if any)
    /// and then every subsequent change event.
    pub fn subscribe(&self) -> Subscription {
        self.registry.attach(|| self.current.load_full())
    }

    /// Attaches a subscriber that only receives subsequent change events.
    pub fn subscribe_changes(&self) -> Subscription {
        self.registry.attach(|| None)
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Applies one head observation.
    ///
    /// The head replaces the snapshot only when its seqno is strictly greater
    /// than the current one; duplicate and out-of-order observations (lagging
    /// upstreams) are ignored. Returns whether a `block` event was emitted.
    ///
    /// The snapshot is installed inside the registry's broadcast step, under
    /// the lock [`subscribe`](Self::subscribe) reads it through, so a
    /// concurrent subscriber receives this head exactly once — as its initial
    /// delivery or as the broadcast, never both.
    fn observe(&self, head: ChainHead) -> bool {
        let _guard = self.write_guard.lock();

        if let Some(current) = self.current.load_full() {
            if head.seqno <= current.seqno {
                return false;
            }
        }

        let head = Arc::new(head);
        debug!(seqno = head.seqno, "chain head advanced");
        self.registry
            .broadcast_with(&head, || self.current.store(Some(Arc::clone(&head))));
        true
    }

    /// Runs one poll cycle.
    async fn poll(&self) {
        match self.source.latest_head().await {
            Ok(head) => {
                self.observe(head);
            }
            Err(e) => {
                warn!(error = %e, "head poll failed, keeping last snapshot");
            }
        }
    }

    /// Starts the background poll loop.
    ///
    /// The loop runs until a shutdown signal arrives; it is independent of any
    /// consumer and survives every per-poll failure.
    pub fn start(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(sync.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => sync.poll().await,
                    _ = shutdown_rx.recv() => {
                        info!("block sync shutting down");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for BlockSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockSync")
            .field("poll_interval", &self.poll_interval)
            .field("subscribers", &self.registry.len())
            .finish_non_exhaustive()
    }
}
