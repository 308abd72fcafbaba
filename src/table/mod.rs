//! Bounded shared tables.
//!
//! A table keeps at most `capacity` rows, evicting the oldest first. Appends
//! are validated against the table schema and applied atomically; each one
//! yields an update batch that is broadcast to the table's subscribers.

mod bounded;
mod registry;

pub use bounded::{BoundedTable, TableStats};
pub use registry::TableRegistry;
