//! Subscription types for live table updates.

use crate::error::{FeedError, Result};
use crate::types::{RowId, Schema, Sequence, StoredRow};
use crossbeam_channel::TryRecvError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Notify;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered update batches before dropping the subscriber.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

impl SubscriptionConfig {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

/// One mutation of a table: the rows it appended and the rows it evicted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UpdateBatch {
    pub table: String,
    /// Table sequence after this mutation.
    pub sequence: Sequence,
    /// Newly retained rows, in append order.
    pub appended: Vec<Arc<StoredRow>>,
    /// Ids of rows that left the table, oldest first.
    pub evicted: Vec<RowId>,
}

impl UpdateBatch {
    pub fn is_empty(&self) -> bool {
        self.appended.is_empty() && self.evicted.is_empty()
    }
}

/// Full point-in-time copy of a table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub table: String,
    /// Sequence of the last mutation contained in `rows`.
    pub sequence: Sequence,
    pub schema: Schema,
    pub capacity: usize,
    /// Shared with the table, so taking a snapshot never copies row data.
    pub rows: Vec<Arc<StoredRow>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Events delivered to a subscriber.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    /// A table mutation, shared between all subscribers.
    Update(Arc<UpdateBatch>),

    /// Subscription was dropped. Always the last event.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The table was removed from its registry.
    TableRemoved,
    /// Server is shutting down.
    Shutdown,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
///
/// Events can be consumed from threads (`recv`, `recv_timeout`) or from async
/// tasks (`recv_async`). Clones share the same queue.
#[derive(Clone)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Backlog the subscription was created with.
    pub buffer_size: usize,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<FeedEvent>,
    /// Signalled by the sender after every event it queues.
    pub(crate) ready: Arc<Notify>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<FeedEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<FeedEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Wait for the next event without holding a thread.
    ///
    /// Returns `None` once the subscription is gone and its queue is drained.
    /// Cancel safe: an event is only taken from the queue when it is returned.
    pub async fn recv_async(&self) -> Option<FeedEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Disconnected) => return None,
                Err(TryRecvError::Empty) => self.ready.notified().await,
            }
        }
    }

    /// Number of events waiting to be consumed.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Block for the next update batch.
    ///
    /// An overflow drop surfaces as [`FeedError::BackpressureDrop`]; any
    /// other end of the subscription as [`FeedError::SubscriptionClosed`].
    pub fn next_batch(&self) -> Result<Arc<UpdateBatch>> {
        match self.receiver.recv() {
            Ok(FeedEvent::Update(batch)) => Ok(batch),
            Ok(FeedEvent::Dropped {
                reason: DropReason::BufferOverflow,
            }) => Err(FeedError::BackpressureDrop {
                id: self.id,
                backlog: self.buffer_size,
            }),
            Ok(FeedEvent::Dropped { .. }) | Err(_) => Err(FeedError::SubscriptionClosed),
        }
    }
}

/// A subscription together with the state it starts from.
pub struct TableSubscription {
    pub snapshot: Snapshot,
    pub handle: SubscriptionHandle,
}
