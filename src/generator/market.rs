//! Random market quotes, the demo feed.

use crate::types::{ColumnType, Row, Schema};
use chrono::Local;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::RowSource;

/// Ticker symbols.
pub const NAMES: [&str; 8] = ["AAPL", "MSFT", "GOOGL", "AMZN", "META", "TSLA", "NVDA", "JPM"];

/// Client names.
pub const CLIENTS: [&str; 8] = [
    "Homer", "Marge", "Bart", "Lisa", "Maggie", "Ned", "Moe", "Barney",
];

/// Name of the demo table.
pub const DEFAULT_TABLE: &str = "data_source_one";

/// Row limit of the demo table.
pub const DEFAULT_CAPACITY: usize = 250_000;

const OPEN_RANGE: std::ops::Range<f64> = 50.0..500.0;
const MAX_SPREAD: f64 = 20.0;

/// Generates quotes with `low <= close <= high` and `low <= open <= high`.
pub struct MarketDataSource {
    rng: StdRng,
}

impl MarketDataSource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic source for tests and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn schema() -> Schema {
        // The column list is static, so this cannot fail.
        Schema::new([
            ("name", ColumnType::String),
            ("client", ColumnType::String),
            ("open", ColumnType::Float),
            ("high", ColumnType::Float),
            ("low", ColumnType::Float),
            ("close", ColumnType::Float),
            ("lastUpdate", ColumnType::Timestamp),
            ("date", ColumnType::Date),
        ])
        .expect("market schema is valid")
    }

    fn quote(&mut self) -> Row {
        let open = self.rng.gen_range(OPEN_RANGE);
        let high = open + self.rng.gen_range(0.0..MAX_SPREAD);
        let low = open - self.rng.gen_range(0.0..MAX_SPREAD);
        let close = self.rng.gen_range(low..=high);
        let now = Local::now().naive_local();

        Row::new()
            .with("name", *NAMES.choose(&mut self.rng).unwrap_or(&NAMES[0]))
            .with("client", *CLIENTS.choose(&mut self.rng).unwrap_or(&CLIENTS[0]))
            .with("open", open)
            .with("high", high)
            .with("low", low)
            .with("close", close)
            .with("lastUpdate", now)
            .with("date", now.date())
    }
}

impl Default for MarketDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RowSource for MarketDataSource {
    fn schema(&self) -> Schema {
        Self::schema()
    }

    fn next_batch(&mut self, batch_size: usize) -> Vec<Row> {
        (0..batch_size).map(|_| self.quote()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn float(row: &Row, column: &str) -> f64 {
        match row.get(column) {
            Some(Value::Float(v)) => *v,
            other => panic!("expected float in {}, got {:?}", column, other),
        }
    }

    #[test]
    fn test_rows_match_schema() {
        let mut source = MarketDataSource::seeded(7);
        let schema = MarketDataSource::schema();

        let batch = source.next_batch(50);
        assert_eq!(batch.len(), 50);
        for (i, row) in batch.iter().enumerate() {
            assert!(schema.validate_row(i, row).is_empty());
        }
    }

    #[test]
    fn test_derived_fields_in_range() {
        let mut source = MarketDataSource::seeded(42);

        for row in source.next_batch(500) {
            let (open, high, low, close) = (
                float(&row, "open"),
                float(&row, "high"),
                float(&row, "low"),
                float(&row, "close"),
            );
            assert!((50.0..500.0).contains(&open));
            assert!(low <= open && open <= high);
            assert!(high - open < MAX_SPREAD && open - low < MAX_SPREAD);
            assert!(low <= close && close <= high);

            match row.get("name") {
                Some(Value::String(name)) => assert!(NAMES.contains(&name.as_str())),
                other => panic!("unexpected name {:?}", other),
            }
            match row.get("client") {
                Some(Value::String(client)) => assert!(CLIENTS.contains(&client.as_str())),
                other => panic!("unexpected client {:?}", other),
            }
        }
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a: Vec<f64> = MarketDataSource::seeded(1)
            .next_batch(10)
            .iter()
            .map(|r| float(r, "close"))
            .collect();
        let b: Vec<f64> = MarketDataSource::seeded(1)
            .next_batch(10)
            .iter()
            .map(|r| float(r, "close"))
            .collect();
        assert_eq!(a, b);
    }
}
