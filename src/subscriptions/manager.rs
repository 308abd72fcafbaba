//! Subscription manager for broadcasting table updates.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::types::{
    DropReason, FeedEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId, UpdateBatch,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum SendOutcome {
    Sent,
    Overflow,
    Gone,
}

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    sender: Sender<FeedEvent>,
    ready: Arc<Notify>,
}

impl Subscription {
    /// Try to queue an update.
    ///
    /// The channel holds one slot more than the backlog so the final
    /// `Dropped` event always fits.
    fn try_send(&self, event: FeedEvent) -> SendOutcome {
        if self.sender.len() >= self.config.buffer_size {
            return SendOutcome::Overflow;
        }
        match self.sender.try_send(event) {
            Ok(()) => {
                self.ready.notify_one();
                SendOutcome::Sent
            }
            Err(crossbeam_channel::TrySendError::Full(_)) => SendOutcome::Overflow,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => SendOutcome::Gone,
        }
    }

    /// Queue the final `Dropped` event. Async receivers rely on it to end,
    /// since dropping the sender alone does not wake them.
    fn close(self, reason: DropReason) {
        // Best effort: a vanished receiver does not care.
        let _ = self.sender.try_send(FeedEvent::Dropped { reason });
        self.ready.notify_one();
    }
}

/// Fans update batches out to the subscribers of one table.
///
/// Callers serialize `broadcast`; each subscriber then sees batches in the
/// order they were broadcast. Sends never block: a subscriber whose backlog
/// is full is removed and told so.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Subscribers dropped for overflowing their backlog.
    overflow_drops: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            overflow_drops: AtomicU64::new(0),
        }
    }

    /// Create a new subscription.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let buffer_size = config.buffer_size.max(1);
        let (sender, receiver) = bounded(buffer_size + 1);

        let ready = Arc::new(Notify::new());

        let subscription = Subscription {
            config: SubscriptionConfig { buffer_size },
            sender,
            ready: Arc::clone(&ready),
        };

        self.subscriptions.write().insert(id, subscription);
        debug!(subscription = id.0, buffer_size, "subscription registered");

        SubscriptionHandle {
            id,
            buffer_size,
            receiver,
            ready,
        }
    }

    /// Unsubscribe and clean up. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id);
        match removed {
            Some(sub) => {
                sub.close(DropReason::Unsubscribed);
                debug!(subscription = id.0, "subscription released");
                true
            }
            None => false,
        }
    }

    /// Drop every subscription with the given reason.
    pub fn close_all(&self, reason: DropReason) -> usize {
        let drained: Vec<Subscription> = {
            let mut subs = self.subscriptions.write();
            subs.drain().map(|(_, sub)| sub).collect()
        };
        let count = drained.len();
        for sub in drained {
            sub.close(reason.clone());
        }
        count
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscriptions.read().contains_key(&id)
    }

    /// Total number of subscribers dropped for a full backlog.
    pub fn overflow_drops(&self) -> u64 {
        self.overflow_drops.load(Ordering::Relaxed)
    }

    /// Broadcast a batch to all subscriptions. Drops subscribers that fail to
    /// receive. Returns the number of subscribers that got the batch.
    pub fn broadcast(&self, batch: &Arc<UpdateBatch>) -> usize {
        let mut to_remove = Vec::new();
        let mut delivered = 0;

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                match sub.try_send(FeedEvent::Update(Arc::clone(batch))) {
                    SendOutcome::Sent => delivered += 1,
                    outcome => to_remove.push((*id, outcome)),
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for (id, outcome) in to_remove {
                let Some(sub) = subs.remove(&id) else {
                    continue;
                };
                if outcome == SendOutcome::Overflow {
                    warn!(
                        table = %batch.table,
                        subscription = id.0,
                        backlog = sub.config.buffer_size,
                        "dropping slow subscriber"
                    );
                    self.overflow_drops.fetch_add(1, Ordering::Relaxed);
                    sub.close(DropReason::BufferOverflow);
                } else {
                    debug!(subscription = id.0, "receiver gone, subscription removed");
                }
            }
        }

        delivered
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
