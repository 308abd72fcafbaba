//! Error types for the feed bridge.

use crate::subscriptions::SubscriptionId;
use crate::types::ColumnType;
use std::fmt;
use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Bad setup: duplicate table name, zero capacity, invalid schema or config.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A batch was rejected because at least one row does not match the schema.
    #[error("Schema mismatch on table {table}: {}", join_violations(.violations))]
    SchemaMismatch {
        table: String,
        violations: Vec<FieldViolation>,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    /// Subscriber queue overflowed; it has to resubscribe for a fresh snapshot.
    #[error("Subscription {id:?} dropped after exceeding a backlog of {backlog} batches")]
    BackpressureDrop { id: SubscriptionId, backlog: usize },

    #[error("Subscription closed")]
    SubscriptionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// One offending field in a rejected batch.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldViolation {
    /// A declared column is absent from the row.
    Missing {
        row: usize,
        column: String,
        expected: ColumnType,
    },
    /// The row carries a key the schema does not declare.
    Unexpected { row: usize, column: String },
    /// The value's type differs from the declared column type.
    TypeMismatch {
        row: usize,
        column: String,
        expected: ColumnType,
        got: String,
    },
    /// NaN or an infinity in a float column; JSON cannot carry these.
    NonFinite { row: usize, column: String },
}

impl FieldViolation {
    /// Index of the offending row within its batch.
    pub fn row(&self) -> usize {
        match self {
            FieldViolation::Missing { row, .. }
            | FieldViolation::Unexpected { row, .. }
            | FieldViolation::TypeMismatch { row, .. }
            | FieldViolation::NonFinite { row, .. } => *row,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            FieldViolation::Missing { column, .. }
            | FieldViolation::Unexpected { column, .. }
            | FieldViolation::TypeMismatch { column, .. }
            | FieldViolation::NonFinite { column, .. } => column,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldViolation::Missing {
                row,
                column,
                expected,
            } => write!(f, "row {}: missing column {} ({})", row, column, expected),
            FieldViolation::Unexpected { row, column } => {
                write!(f, "row {}: unexpected column {}", row, column)
            }
            FieldViolation::TypeMismatch {
                row,
                column,
                expected,
                got,
            } => write!(
                f,
                "row {}: column {} expected {}, got {}",
                row, column, expected, got
            ),
            FieldViolation::NonFinite { row, column } => {
                write!(f, "row {}: column {} is not a finite number", row, column)
            }
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for FeedError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for FeedError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        FeedError::Deserialization(e.to_string())
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, FeedError>;
