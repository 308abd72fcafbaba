//! Core types for the feed bridge.

use crate::error::{FeedError, FieldViolation, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Identifier of a row, assigned by its table in append order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Debug for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowId({})", self.0)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutation counter of a table. Advanced once per non-empty append.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Primitive column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Timestamp,
    Date,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A single cell value.
///
/// Serialized without a tag: strings, numbers and booleans map to their JSON
/// counterparts, timestamps and dates to ISO-8601 strings. Decoding therefore
/// needs the schema, see [`Value::from_json`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::String(_) => ColumnType::String,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Date(_) => ColumnType::Date,
        }
    }

    /// Decode a JSON value as the given column type.
    ///
    /// Integers are widened for float columns. Timestamps accept both naive
    /// ISO-8601 and RFC 3339 (converted to UTC).
    pub fn from_json(value: &serde_json::Value, column_type: ColumnType) -> Option<Value> {
        use serde_json::Value as Json;

        match (column_type, value) {
            (ColumnType::String, Json::String(s)) => Some(Value::String(s.clone())),
            (ColumnType::Integer, Json::Number(n)) => n.as_i64().map(Value::Integer),
            (ColumnType::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (ColumnType::Boolean, Json::Bool(b)) => Some(Value::Boolean(*b)),
            (ColumnType::Timestamp, Json::String(s)) => s
                .parse::<NaiveDateTime>()
                .ok()
                .or_else(|| {
                    DateTime::parse_from_rfc3339(s)
                        .ok()
                        .map(|dt| dt.naive_utc())
                })
                .map(Value::Timestamp),
            (ColumnType::Date, Json::String(s)) => s.parse::<NaiveDate>().ok().map(Value::Date),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

/// A named, typed column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Ordered column declarations of a table. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Column>", into = "Vec<Column>")]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema from `(name, type)` pairs.
    ///
    /// Fails with a configuration error when there are no columns or a name
    /// is empty or repeated.
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, column_type)| Column {
                name: name.into(),
                column_type,
            })
            .collect();
        Self::from_columns(columns)
    }

    fn from_columns(columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(FeedError::Configuration(
                "schema must declare at least one column".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.name.is_empty() {
                return Err(FeedError::Configuration(
                    "column names must not be empty".to_string(),
                ));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(FeedError::Configuration(format!(
                    "duplicate column name: {}",
                    column.name
                )));
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column_type(name).is_some()
    }

    /// Schema restricted to `columns`, in the order given.
    pub fn project(&self, table: &str, columns: &[String]) -> Result<Schema> {
        let mut projected = Vec::with_capacity(columns.len());
        for name in columns {
            let column_type = self
                .column_type(name)
                .ok_or_else(|| FeedError::UnknownColumn {
                    table: table.to_string(),
                    column: name.clone(),
                })?;
            projected.push(Column {
                name: name.clone(),
                column_type,
            });
        }
        Self::from_columns(projected)
    }

    /// Check one row against the schema. `index` is the row's position in
    /// its batch and is only used for reporting.
    pub fn validate_row(&self, index: usize, row: &Row) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        for column in &self.columns {
            match row.get(&column.name) {
                None => violations.push(FieldViolation::Missing {
                    row: index,
                    column: column.name.clone(),
                    expected: column.column_type,
                }),
                Some(value) if value.column_type() != column.column_type => {
                    violations.push(FieldViolation::TypeMismatch {
                        row: index,
                        column: column.name.clone(),
                        expected: column.column_type,
                        got: value.column_type().to_string(),
                    })
                }
                Some(Value::Float(v)) if !v.is_finite() => {
                    violations.push(FieldViolation::NonFinite {
                        row: index,
                        column: column.name.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        for key in row.keys() {
            if !self.contains(key) {
                violations.push(FieldViolation::Unexpected {
                    row: index,
                    column: key.to_string(),
                });
            }
        }

        violations
    }

    /// Decode a JSON object into a row of this schema.
    ///
    /// Keys the schema does not declare and values that cannot be decoded as
    /// the declared type are reported as a schema mismatch against `table`.
    pub fn row_from_json(&self, table: &str, value: &serde_json::Value) -> Result<Row> {
        let object = value.as_object().ok_or_else(|| {
            FeedError::Deserialization(format!("expected a JSON object, got {}", value))
        })?;

        let mut row = Row::new();
        let mut violations = Vec::new();

        for (key, raw) in object {
            match self.column_type(key) {
                None => violations.push(FieldViolation::Unexpected {
                    row: 0,
                    column: key.clone(),
                }),
                Some(column_type) => match Value::from_json(raw, column_type) {
                    Some(v) => row.insert(key.clone(), v),
                    None => violations.push(FieldViolation::TypeMismatch {
                        row: 0,
                        column: key.clone(),
                        expected: column_type,
                        got: json_type_name(raw).to_string(),
                    }),
                },
            }
        }

        for column in &self.columns {
            if !object.contains_key(&column.name) {
                violations.push(FieldViolation::Missing {
                    row: 0,
                    column: column.name.clone(),
                    expected: column.column_type,
                });
            }
        }

        if violations.is_empty() {
            Ok(row)
        } else {
            Err(FeedError::SchemaMismatch {
                table: table.to_string(),
                violations,
            })
        }
    }
}

impl TryFrom<Vec<Column>> for Schema {
    type Error = FeedError;

    fn try_from(columns: Vec<Column>) -> Result<Self> {
        Self::from_columns(columns)
    }
}

impl From<Schema> for Vec<Column> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// A record: column name to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the named columns.
    pub fn project(&self, columns: &[String]) -> Row {
        Row(columns
            .iter()
            .filter_map(|c| self.0.get(c).map(|v| (c.clone(), v.clone())))
            .collect())
    }
}

/// A row as retained by a table, tagged with its id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredRow {
    pub id: RowId,
    pub row: Row,
}

impl StoredRow {
    pub fn project(&self, columns: &[String]) -> StoredRow {
        StoredRow {
            id: self.id,
            row: self.row.project(columns),
        }
    }
}
