//! Periodic generator task feeding a table.

use crate::error::Result;
use crate::subscriptions::UpdateBatch;
use crate::table::BoundedTable;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use super::RowSource;

/// Generator cadence.
#[derive(Clone, Debug)]
pub struct GeneratorConfig {
    /// Time between batches. Default: 50ms
    pub period: Duration,
    /// Rows per batch. Default: 5
    pub batch_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(50),
            batch_size: 5,
        }
    }
}

/// Counters of a generator run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub cycles: u64,
    pub rows_appended: u64,
    pub failed_batches: u64,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    rows_appended: AtomicU64,
    failed_batches: AtomicU64,
}

/// Pulls batches from a [`RowSource`] and appends them to one table.
pub struct Generator<S> {
    table: Arc<BoundedTable>,
    source: S,
    config: GeneratorConfig,
    counters: Arc<Counters>,
}

impl<S: RowSource> Generator<S> {
    pub fn new(table: Arc<BoundedTable>, source: S, config: GeneratorConfig) -> Self {
        Self {
            table,
            source,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Run one cycle: generate a batch and append it.
    pub fn tick(&mut self) -> Result<Arc<UpdateBatch>> {
        let rows = self.source.next_batch(self.config.batch_size);
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);

        match self.table.append(rows) {
            Ok(batch) => {
                self.counters
                    .rows_appended
                    .fetch_add(batch.appended.len() as u64, Ordering::Relaxed);
                Ok(batch)
            }
            Err(e) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> GeneratorStats {
        GeneratorStats {
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            rows_appended: self.counters.rows_appended.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
        }
    }

    /// Run on the tokio runtime until `cancel` fires.
    ///
    /// A failed append is logged and the next cycle runs as scheduled. The
    /// task resolves to the final counters.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<GeneratorStats> {
        tokio::spawn(async move {
            let mut tick = interval(self.config.period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                table = %self.table.name(),
                period_ms = self.config.period.as_millis() as u64,
                batch_size = self.config.batch_size,
                "generator started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,

                    _ = tick.tick() => match self.tick() {
                        Ok(batch) => trace!(sequence = batch.sequence.0, "generated batch"),
                        Err(e) => warn!(table = %self.table.name(), error = %e, "batch rejected"),
                    },
                }
            }

            let stats = self.stats();
            info!(
                table = %self.table.name(),
                cycles = stats.cycles,
                rows = stats.rows_appended,
                failed = stats.failed_batches,
                "generator stopped"
            );
            stats
        })
    }
}
