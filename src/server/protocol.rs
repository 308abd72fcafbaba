//! Messages exchanged between subscribers and the feed server.

use crate::error::{FeedError, Result};
use crate::subscriptions::{DropReason, Snapshot, UpdateBatch};
use crate::table::TableStats;
use crate::types::{RowId, Schema, Sequence, StoredRow};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error codes sent in [`ServerMessage::Error`].
pub mod codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const UNKNOWN_TABLE: &str = "UNKNOWN_TABLE";
    pub const UNKNOWN_COLUMN: &str = "UNKNOWN_COLUMN";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const NOT_SUBSCRIBED: &str = "NOT_SUBSCRIBED";
}

/// Requests sent by a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a table, optionally to a subset of its columns.
    Subscribe {
        table: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        columns: Option<Vec<String>>,
    },

    /// Leave the current subscription but keep the connection.
    Unsubscribe,

    /// Ask for the hosted tables.
    ListTables,
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| FeedError::Protocol(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| FeedError::Protocol(e.to_string()))
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full table state; the first message of every subscription.
    Snapshot {
        table: String,
        sequence: Sequence,
        schema: Schema,
        capacity: usize,
        rows: Vec<Arc<StoredRow>>,
    },

    /// One table mutation.
    Update {
        table: String,
        sequence: Sequence,
        appended: Vec<Arc<StoredRow>>,
        evicted: Vec<RowId>,
    },

    /// Response to `list_tables`.
    Tables { tables: Vec<TableStats> },

    /// Response to `unsubscribe`.
    Unsubscribed { table: String },

    /// The subscription ended on the server side. After `buffer_overflow`
    /// the client should subscribe again for a fresh snapshot.
    Dropped { table: String, reason: DropReason },

    /// Error response
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Snapshot message, restricted to `columns` when given. `schema` must
    /// already be the projected schema.
    pub fn snapshot(snapshot: Snapshot, schema: Schema, columns: Option<&[String]>) -> Self {
        let rows = match columns {
            Some(columns) => snapshot
                .rows
                .iter()
                .map(|r| Arc::new(r.project(columns)))
                .collect(),
            None => snapshot.rows,
        };
        ServerMessage::Snapshot {
            table: snapshot.table,
            sequence: snapshot.sequence,
            schema,
            capacity: snapshot.capacity,
            rows,
        }
    }

    pub fn update(batch: &UpdateBatch, columns: Option<&[String]>) -> Self {
        let appended = match columns {
            Some(columns) => batch
                .appended
                .iter()
                .map(|r| Arc::new(r.project(columns)))
                .collect(),
            None => batch.appended.clone(),
        };
        ServerMessage::Update {
            table: batch.table.clone(),
            sequence: batch.sequence,
            appended,
            evicted: batch.evicted.clone(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Error response for a failed request.
    pub fn from_error(err: &FeedError) -> Self {
        let code = match err {
            FeedError::UnknownTable(_) => codes::UNKNOWN_TABLE,
            FeedError::UnknownColumn { .. } => codes::UNKNOWN_COLUMN,
            FeedError::Protocol(_) | FeedError::Deserialization(_) => codes::PARSE_ERROR,
            _ => codes::INVALID_REQUEST,
        };
        Self::error(code, err.to_string())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// MessagePack with field names, so it decodes to the same shape as JSON.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

/// Encoding used for server messages on one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// JSON text frames
    #[default]
    Json,
    /// MessagePack binary frames
    #[serde(rename = "msgpack")]
    MessagePack,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnType, Row};
    use serde_json::json;

    fn sample_batch() -> UpdateBatch {
        UpdateBatch {
            table: "quotes".to_string(),
            sequence: Sequence(4),
            appended: vec![Arc::new(StoredRow {
                id: RowId(9),
                row: Row::new().with("name", "AAPL").with("open", 101.5),
            })],
            evicted: vec![RowId(1), RowId(2)],
        }
    }

    #[test]
    fn test_parse_client_messages() {
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"subscribe","table":"quotes"}"#).unwrap(),
            ClientMessage::Subscribe {
                table: "quotes".to_string(),
                columns: None
            }
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"subscribe","table":"q","columns":["a"]}"#)
                .unwrap(),
            ClientMessage::Subscribe {
                table: "q".to_string(),
                columns: Some(vec!["a".to_string()])
            }
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"list_tables"}"#).unwrap(),
            ClientMessage::ListTables
        );
        assert!(matches!(
            ClientMessage::from_json(r#"{"type":"drop_table"}"#),
            Err(FeedError::Protocol(_))
        ));
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_client_message_msgpack() {
        let msg = ClientMessage::Subscribe {
            table: "quotes".to_string(),
            columns: None,
        };
        let bytes = rmp_serde::to_vec_named(&msg).unwrap();
        assert_eq!(ClientMessage::from_msgpack(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_update_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&ServerMessage::update(&sample_batch(), None).to_json().unwrap())
                .unwrap();
        assert_eq!(
            json,
            json!({
                "type": "update",
                "table": "quotes",
                "sequence": 4,
                "appended": [{"id": 9, "row": {"name": "AAPL", "open": 101.5}}],
                "evicted": [1, 2],
            })
        );
    }

    #[test]
    fn test_update_projection() {
        let columns = vec!["open".to_string()];
        match ServerMessage::update(&sample_batch(), Some(&columns)) {
            ServerMessage::Update { appended, .. } => {
                assert_eq!(appended[0].row.len(), 1);
                assert!(appended[0].row.get("name").is_none());
            }
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_json_shape() {
        let schema = Schema::new([("name", ColumnType::String)]).unwrap();
        let snapshot = Snapshot {
            table: "names".to_string(),
            sequence: Sequence(1),
            schema: schema.clone(),
            capacity: 10,
            rows: vec![Arc::new(StoredRow {
                id: RowId(1),
                row: Row::new().with("name", "Bob"),
            })],
        };
        let json: serde_json::Value = serde_json::from_str(
            &ServerMessage::snapshot(snapshot, schema, None)
                .to_json()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["schema"], json!([{"name": "name", "type": "string"}]));
        assert_eq!(json["rows"][0]["row"]["name"], "Bob");
        assert_eq!(json["capacity"], 10);
    }

    #[test]
    fn test_msgpack_uses_field_names() {
        let msg = ServerMessage::update(&sample_batch(), None);
        let bytes = msg.to_msgpack().unwrap();
        let decoded: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded["type"], "update");
        assert_eq!(decoded["table"], "quotes");
        assert_eq!(decoded["appended"][0]["row"]["name"], "AAPL");
        assert_eq!(decoded["appended"][0]["row"]["open"], 101.5);
    }

    #[test]
    fn test_error_codes() {
        let unknown = ServerMessage::from_error(&FeedError::UnknownTable("x".to_string()));
        match unknown {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, codes::UNKNOWN_TABLE);
                assert!(message.contains("x"));
            }
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[test]
    fn test_wire_format_names() {
        let f: WireFormat = serde_json::from_value(json!("msgpack")).unwrap();
        assert_eq!(f, WireFormat::MessagePack);
        let f: WireFormat = serde_json::from_value(json!("json")).unwrap();
        assert_eq!(f, WireFormat::Json);
    }
}
