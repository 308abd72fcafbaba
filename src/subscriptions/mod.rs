//! Subscription system for live table updates.
//!
//! Every table owns a [`SubscriptionManager`] that fans its update batches
//! out to subscribers:
//! - Batches arrive in the order the table produced them
//! - Each subscriber has its own bounded backlog
//! - A subscriber whose backlog overflows is dropped and has to resubscribe
//!   to get a fresh snapshot
//!
//! # Example
//!
//! ```ignore
//! let sub = table.subscribe(SubscriptionConfig::with_buffer_size(64))?;
//! render(&sub.snapshot);
//!
//! loop {
//!     match sub.handle.next_batch() {
//!         Ok(batch) => apply(&batch),
//!         Err(FeedError::BackpressureDrop { .. }) => break, // resubscribe
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, FeedEvent, Snapshot, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    TableSubscription, UpdateBatch,
};
