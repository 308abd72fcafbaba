//! Error handling and edge case tests.

use feedbridge::{
    BoundedTable, BridgeConfig, ColumnType, FeedError, FieldViolation, Row, RowId, Schema,
    SubscriptionConfig, TableRegistry,
};
use serde_json::json;

fn quote_schema() -> Schema {
    Schema::new([
        ("name", ColumnType::String),
        ("open", ColumnType::Float),
        ("volume", ColumnType::Integer),
    ])
    .unwrap()
}

fn quote(name: &str, open: f64, volume: i64) -> Row {
    Row::new()
        .with("name", name)
        .with("open", open)
        .with("volume", volume)
}

// --- Configuration Errors ---

#[test]
fn test_schema_without_columns() {
    let result = Schema::new(Vec::<(String, ColumnType)>::new());
    assert!(matches!(result, Err(FeedError::Configuration(_))));
}

#[test]
fn test_schema_duplicate_column() {
    let result = Schema::new([("a", ColumnType::String), ("a", ColumnType::Integer)]);
    assert!(matches!(result, Err(FeedError::Configuration(_))));
}

#[test]
fn test_zero_capacity_table() {
    let registry = TableRegistry::new();
    let result = registry.create("quotes", quote_schema(), 0);
    assert!(matches!(result, Err(FeedError::Configuration(_))));
    assert!(registry.is_empty());
}

#[test]
fn test_duplicate_table_name() {
    let registry = TableRegistry::new();
    registry.create("quotes", quote_schema(), 10).unwrap();

    let result = registry.create("quotes", quote_schema(), 20);
    assert!(matches!(result, Err(FeedError::Configuration(_))));

    // The first table is untouched
    assert_eq!(registry.get("quotes").unwrap().capacity(), 10);
}

#[test]
fn test_invalid_bridge_config() {
    let config = BridgeConfig {
        subscriber_backlog: 0,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(FeedError::Configuration(_))));

    let config = BridgeConfig {
        websocket_path: "websocket".to_string(),
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(FeedError::Configuration(_))));
}

// --- Lookup Errors ---

#[test]
fn test_unknown_table() {
    let registry = TableRegistry::new();
    match registry.get("missing") {
        Err(FeedError::UnknownTable(name)) => assert_eq!(name, "missing"),
        other => panic!("Expected UnknownTable, got {:?}", other),
    }
    assert!(matches!(
        registry.remove("missing"),
        Err(FeedError::UnknownTable(_))
    ));
}

#[test]
fn test_unknown_column_projection() {
    let schema = quote_schema();
    match schema.project("quotes", &["name".to_string(), "bid".to_string()]) {
        Err(FeedError::UnknownColumn { table, column }) => {
            assert_eq!(table, "quotes");
            assert_eq!(column, "bid");
        }
        other => panic!("Expected UnknownColumn, got {:?}", other),
    }
}

// --- Schema Mismatch ---

#[test]
fn test_mismatch_reports_every_violation() {
    let table = BoundedTable::new("quotes", quote_schema(), 10).unwrap();

    let batch = vec![
        quote("AAPL", 100.0, 10),
        Row::new().with("name", "MSFT").with("open", 1.0),
        quote("IBM", 50.0, 5).with("bid", 49.5),
    ];
    let err = table.append(batch).unwrap_err();

    let violations = match err {
        FeedError::SchemaMismatch { violations, .. } => violations,
        other => panic!("Expected SchemaMismatch, got {:?}", other),
    };
    assert_eq!(
        violations,
        vec![
            FieldViolation::Missing {
                row: 1,
                column: "volume".to_string(),
                expected: ColumnType::Integer,
            },
            FieldViolation::Unexpected {
                row: 2,
                column: "bid".to_string(),
            },
        ]
    );
    assert!(table.is_empty());
}

#[test]
fn test_mismatch_does_not_reach_subscribers() {
    let table = BoundedTable::new("quotes", quote_schema(), 10).unwrap();
    let sub = table.subscribe(SubscriptionConfig::default()).unwrap();

    let result = table.append(vec![quote("AAPL", 1.0, 1), Row::new().with("name", 3i64)]);
    assert!(result.is_err());
    assert_eq!(sub.handle.pending(), 0);

    // The next good batch still gets the next row id
    let batch = table.append(vec![quote("AAPL", 1.0, 1)]).unwrap();
    assert_eq!(batch.appended[0].id, RowId(1));
    assert_eq!(sub.handle.pending(), 1);
}

#[test]
fn test_non_finite_float_rejected() {
    let table = BoundedTable::new("quotes", quote_schema(), 10).unwrap();
    table.append(vec![quote("AAPL", 1.0, 1)]).unwrap();

    let err = table
        .append(vec![quote("MSFT", 2.0, 1), quote("IBM", f64::NAN, 1)])
        .unwrap_err();
    match err {
        FeedError::SchemaMismatch { violations, .. } => assert_eq!(
            violations,
            vec![FieldViolation::NonFinite {
                row: 1,
                column: "open".to_string(),
            }]
        ),
        other => panic!("Expected SchemaMismatch, got {:?}", other),
    }
    assert_eq!(table.len(), 1);
}

#[test]
fn test_error_message_names_table_and_column() {
    let table = BoundedTable::new("quotes", quote_schema(), 10).unwrap();
    let err = table
        .append(vec![quote("AAPL", 1.0, 1).with("volume", "lots")])
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("quotes"), "{}", message);
    assert!(message.contains("volume"), "{}", message);
}

// --- JSON Rows ---

#[test]
fn test_row_from_json() {
    let schema = quote_schema();

    let row = schema
        .row_from_json("quotes", &json!({"name": "AAPL", "open": 12, "volume": 3}))
        .unwrap();
    assert!(schema.validate_row(0, &row).is_empty());

    let err = schema
        .row_from_json("quotes", &json!({"name": "AAPL", "open": "12", "volume": 3}))
        .unwrap_err();
    assert!(matches!(err, FeedError::SchemaMismatch { .. }));

    let err = schema.row_from_json("quotes", &json!([1, 2, 3])).unwrap_err();
    assert!(matches!(err, FeedError::Deserialization(_)));
}

// --- Subscription End ---

#[test]
fn test_removed_table_closes_subscription() {
    let registry = TableRegistry::new();
    let table = registry.create("quotes", quote_schema(), 10).unwrap();
    let sub = table.subscribe(SubscriptionConfig::default()).unwrap();

    registry.remove("quotes").unwrap();
    assert!(matches!(
        sub.handle.next_batch(),
        Err(FeedError::SubscriptionClosed)
    ));
}
