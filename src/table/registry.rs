//! Process-wide registry of named tables.

use crate::error::{FeedError, Result};
use crate::subscriptions::DropReason;
use crate::types::Schema;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::bounded::{BoundedTable, TableStats};

/// Named tables hosted by one server process. Names are unique.
#[derive(Default)]
pub struct TableRegistry {
    tables: RwLock<HashMap<String, Arc<BoundedTable>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a table.
    ///
    /// Fails with a configuration error if the name is taken, empty, or the
    /// capacity is zero.
    pub fn create(
        &self,
        name: impl Into<String>,
        schema: Schema,
        capacity: usize,
    ) -> Result<Arc<BoundedTable>> {
        let name = name.into();
        let mut tables = self.tables.write();
        if tables.contains_key(&name) {
            return Err(FeedError::Configuration(format!(
                "table already exists: {}",
                name
            )));
        }

        let table = Arc::new(BoundedTable::new(name.clone(), schema, capacity)?);
        tables.insert(name.clone(), Arc::clone(&table));
        info!(table = %name, capacity, columns = table.schema().len(), "table created");

        Ok(table)
    }

    pub fn get(&self, name: &str) -> Result<Arc<BoundedTable>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FeedError::UnknownTable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// Table names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    /// Stats of every table, sorted by name.
    pub fn stats(&self) -> Vec<TableStats> {
        let mut stats: Vec<TableStats> = self.tables.read().values().map(|t| t.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Remove a table and drop its subscribers.
    pub fn remove(&self, name: &str) -> Result<Arc<BoundedTable>> {
        let table = self
            .tables
            .write()
            .remove(name)
            .ok_or_else(|| FeedError::UnknownTable(name.to_string()))?;
        let dropped = table.close(DropReason::TableRemoved);
        info!(table = %name, dropped, "table removed");
        Ok(table)
    }

    /// Drop every subscriber of every table. Tables stay registered.
    pub fn close_all(&self) -> usize {
        let tables: Vec<Arc<BoundedTable>> = self.tables.read().values().cloned().collect();
        tables
            .iter()
            .map(|t| t.close_subscriptions(DropReason::Shutdown))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriptions::{FeedEvent, SubscriptionConfig};
    use crate::types::ColumnType;

    fn schema() -> Schema {
        Schema::new([("name", ColumnType::String)]).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let registry = TableRegistry::new();
        registry.create("b", schema(), 10).unwrap();
        registry.create("a", schema(), 10).unwrap();

        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.get("a").unwrap().capacity(), 10);
        assert!(matches!(
            registry.get("missing"),
            Err(FeedError::UnknownTable(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_duplicate_name() {
        let registry = TableRegistry::new();
        registry.create("quotes", schema(), 10).unwrap();

        let result = registry.create("quotes", schema(), 20);
        assert!(matches!(result, Err(FeedError::Configuration(_))));
        assert_eq!(registry.get("quotes").unwrap().capacity(), 10);
    }

    #[test]
    fn test_zero_capacity_not_registered() {
        let registry = TableRegistry::new();
        assert!(registry.create("quotes", schema(), 0).is_err());
        assert!(!registry.contains("quotes"));
    }

    #[test]
    fn test_remove_drops_subscribers() {
        let registry = TableRegistry::new();
        let table = registry.create("quotes", schema(), 10).unwrap();
        let sub = table.subscribe(SubscriptionConfig::default()).unwrap();

        registry.remove("quotes").unwrap();
        assert!(registry.is_empty());
        match sub.handle.recv().unwrap() {
            FeedEvent::Dropped { reason } => assert_eq!(reason, DropReason::TableRemoved),
            other => panic!("Expected Dropped event, got {:?}", other),
        }
        assert!(matches!(
            registry.remove("quotes"),
            Err(FeedError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_removed_table_refuses_late_subscriber() {
        let registry = TableRegistry::new();
        // A connection resolved the table just before it was removed
        let table = registry.create("quotes", schema(), 10).unwrap();
        registry.remove("quotes").unwrap();

        assert!(matches!(
            table.subscribe(SubscriptionConfig::default()),
            Err(FeedError::UnknownTable(name)) if name == "quotes"
        ));
        assert_eq!(table.subscription_count(), 0);
    }

    #[test]
    fn test_close_all() {
        let registry = TableRegistry::new();
        let a = registry.create("a", schema(), 10).unwrap();
        let b = registry.create("b", schema(), 10).unwrap();
        let _sa = a.subscribe(SubscriptionConfig::default()).unwrap();
        let _sb = b.subscribe(SubscriptionConfig::default()).unwrap();

        assert_eq!(registry.close_all(), 2);
        assert_eq!(a.subscription_count() + b.subscription_count(), 0);
        assert_eq!(registry.len(), 2);
    }
}
