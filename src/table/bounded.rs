//! Capacity-bounded, schema-typed row table.

use crate::error::{FeedError, Result};
use crate::subscriptions::{
    DropReason, Snapshot, SubscriptionConfig, SubscriptionId, SubscriptionManager,
    TableSubscription, UpdateBatch,
};
use crate::types::{Row, RowId, Schema, Sequence, StoredRow};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Retained rows plus counters, swapped as a unit under the state lock.
#[derive(Debug, Default)]
struct TableState {
    rows: VecDeque<Arc<StoredRow>>,
    next_row_id: u64,
    sequence: Sequence,
    total_appended: u64,
    total_evicted: u64,
}

/// Point-in-time counters of a table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub len: usize,
    pub capacity: usize,
    pub sequence: Sequence,
    pub total_appended: u64,
    pub total_evicted: u64,
    pub subscribers: usize,
}

/// An append-only table holding at most `capacity` rows.
///
/// When an append pushes the table over capacity the oldest rows are
/// evicted first. Appends are serialized by a write lock that is held until
/// the resulting batch has been handed to every subscriber, so batches are
/// broadcast in the order they were produced. Readers copy the state under a
/// short read lock and never see half an append. Retained rows are shared
/// with snapshots and batches, so a copy only clones pointers.
pub struct BoundedTable {
    name: String,
    schema: Schema,
    capacity: usize,

    state: RwLock<TableState>,

    /// Lock for write operations to ensure atomicity.
    write_lock: Mutex<()>,

    notifier: SubscriptionManager,

    /// Set once the table leaves its registry; no new subscribers after that.
    closed: AtomicBool,
}

impl BoundedTable {
    /// Create an empty table.
    ///
    /// Fails with a configuration error for an empty name or zero capacity.
    pub fn new(name: impl Into<String>, schema: Schema, capacity: usize) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FeedError::Configuration(
                "table name must not be empty".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(FeedError::Configuration(format!(
                "table {} must have a capacity greater than zero",
                name
            )));
        }

        Ok(Self {
            name,
            schema,
            capacity,
            state: RwLock::new(TableState {
                next_row_id: 1,
                ..Default::default()
            }),
            write_lock: Mutex::new(()),
            notifier: SubscriptionManager::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().rows.is_empty()
    }

    pub fn sequence(&self) -> Sequence {
        self.state.read().sequence
    }

    /// Append a batch of rows.
    ///
    /// Every row is validated first; if any row violates the schema the
    /// whole batch is rejected and the table is left untouched. Otherwise
    /// the rows are appended, the oldest rows are evicted down to capacity,
    /// and the resulting batch is broadcast to subscribers.
    ///
    /// An empty batch changes nothing and is not broadcast.
    pub fn append(&self, rows: Vec<Row>) -> Result<Arc<UpdateBatch>> {
        let _lock = self.write_lock.lock();

        let violations: Vec<_> = rows
            .iter()
            .enumerate()
            .flat_map(|(i, row)| self.schema.validate_row(i, row))
            .collect();
        if !violations.is_empty() {
            return Err(FeedError::SchemaMismatch {
                table: self.name.clone(),
                violations,
            });
        }

        if rows.is_empty() {
            return Ok(Arc::new(UpdateBatch {
                table: self.name.clone(),
                sequence: self.sequence(),
                appended: Vec::new(),
                evicted: Vec::new(),
            }));
        }

        let batch = {
            let mut state = self.state.write();

            // Rows that would be evicted by their own batch are never retained.
            let skip = rows.len().saturating_sub(self.capacity);
            let first_id = state.next_row_id;
            state.next_row_id += rows.len() as u64;

            let appended: Vec<Arc<StoredRow>> = rows
                .into_iter()
                .enumerate()
                .skip(skip)
                .map(|(i, row)| {
                    Arc::new(StoredRow {
                        id: RowId(first_id + i as u64),
                        row,
                    })
                })
                .collect();

            let overflow = (state.rows.len() + appended.len()).saturating_sub(self.capacity);
            let evicted: Vec<RowId> = state.rows.drain(..overflow).map(|r| r.id).collect();

            state.rows.extend(appended.iter().cloned());
            state.sequence = state.sequence.next();
            state.total_appended += appended.len() as u64;
            state.total_evicted += evicted.len() as u64;

            debug_assert!(state.rows.len() <= self.capacity);

            UpdateBatch {
                table: self.name.clone(),
                sequence: state.sequence,
                appended,
                evicted,
            }
        };

        let batch = Arc::new(batch);
        let delivered = self.notifier.broadcast(&batch);
        trace!(
            table = %self.name,
            sequence = batch.sequence.0,
            appended = batch.appended.len(),
            evicted = batch.evicted.len(),
            delivered,
            "batch appended"
        );

        Ok(batch)
    }

    /// Copy of the current rows.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            table: self.name.clone(),
            sequence: state.sequence,
            schema: self.schema.clone(),
            capacity: self.capacity,
            rows: state.rows.iter().cloned().collect(),
        }
    }

    /// Register a subscriber.
    ///
    /// The snapshot and the registration happen under the write lock, so the
    /// subscriber receives exactly the batches appended after its snapshot.
    /// Fails with `UnknownTable` once the table has been closed.
    pub fn subscribe(&self, config: SubscriptionConfig) -> Result<TableSubscription> {
        let _lock = self.write_lock.lock();
        if self.is_closed() {
            return Err(FeedError::UnknownTable(self.name.clone()));
        }
        let snapshot = self.snapshot();
        let handle = self.notifier.subscribe(config);
        Ok(TableSubscription { snapshot, handle })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Drop all subscribers of this table.
    pub fn close_subscriptions(&self, reason: DropReason) -> usize {
        self.notifier.close_all(reason)
    }

    /// Refuse new subscribers and drop the current ones. Appends still work.
    pub fn close(&self, reason: DropReason) -> usize {
        let _lock = self.write_lock.lock();
        self.closed.store(true, Ordering::Release);
        let dropped = self.notifier.close_all(reason);
        debug!(table = %self.name, dropped, "table closed to subscribers");
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscription_count(&self) -> usize {
        self.notifier.subscription_count()
    }

    /// Total number of subscribers dropped for a full backlog.
    pub fn overflow_drops(&self) -> u64 {
        self.notifier.overflow_drops()
    }

    pub fn stats(&self) -> TableStats {
        let state = self.state.read();
        TableStats {
            name: self.name.clone(),
            len: state.rows.len(),
            capacity: self.capacity,
            sequence: state.sequence,
            total_appended: state.total_appended,
            total_evicted: state.total_evicted,
            subscribers: self.notifier.subscription_count(),
        }
    }
}

impl std::fmt::Debug for BoundedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedTable")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
