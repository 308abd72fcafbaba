//! Row generation.
//!
//! A [`RowSource`] produces batches of rows; a [`Generator`] appends one
//! batch per period to a table until it is cancelled.

mod market;
mod runner;

use crate::types::{Row, Schema};

pub use market::{MarketDataSource, CLIENTS, DEFAULT_CAPACITY, DEFAULT_TABLE, NAMES};
pub use runner::{Generator, GeneratorConfig, GeneratorStats};

/// Produces batches of rows for a table.
pub trait RowSource: Send + 'static {
    /// Schema of the rows this source produces.
    fn schema(&self) -> Schema;

    /// Produce `batch_size` rows.
    fn next_batch(&mut self, batch_size: usize) -> Vec<Row>;
}
