//! Props for embedding the grid viewer in a host page.
//!
//! The viewer runs in the host's frontend. This module only builds the
//! payload it is mounted with, for either static rows or a live table
//! served by [`crate::server::FeedServer`], and reads back the state the
//! viewer reports when the user changes its configuration.

use crate::error::{FeedError, Result};
use crate::types::Row;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Height of the viewer in pixels when not given.
pub const DEFAULT_HEIGHT: u32 = 500;

/// Display options shared by both viewer modes.
#[derive(Clone, Debug, Default)]
pub struct ViewerOptions {
    /// Viewer configuration (plugin, theme, columns, sort, ...), passed through.
    pub config: Option<Map<String, Json>>,
    pub height: Option<u32>,
    /// Stable instance key so the host keeps the same viewer across re-renders.
    pub key: Option<String>,
}

impl ViewerOptions {
    pub fn height(&self) -> u32 {
        self.height.unwrap_or(DEFAULT_HEIGHT)
    }
}

/// Data source of a viewer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewerData {
    Static {
        rows: Vec<Row>,
        height: u32,
        config: Option<Map<String, Json>>,
    },
    Websocket {
        url: String,
        table_name: String,
        height: u32,
        config: Option<Map<String, Json>>,
    },
}

/// State reported back by the viewer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerState {
    #[serde(default)]
    pub config: Map<String, Json>,
}

impl ViewerState {
    /// Parse the value the host returns for a viewer instance.
    pub fn from_json(value: Json) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| FeedError::Deserialization(e.to_string()))
    }
}

/// Everything the host needs to mount one viewer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewerProps {
    pub data: ViewerData,
    /// Returned by the host until the viewer reports its own state.
    pub default: ViewerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub height: u32,
}

/// Viewer over rows held in memory by the host.
pub fn static_viewer(rows: Vec<Row>, options: ViewerOptions) -> ViewerProps {
    let height = options.height();
    ViewerProps {
        default: default_state(&options),
        data: ViewerData::Static {
            rows,
            height,
            config: options.config,
        },
        key: options.key,
        height,
    }
}

/// Viewer attached to a table of a running feed server.
pub fn websocket_viewer(
    url: impl Into<String>,
    table_name: impl Into<String>,
    options: ViewerOptions,
) -> Result<ViewerProps> {
    let url = url.into();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(FeedError::Configuration(format!(
            "viewer url must be a ws:// or wss:// url: {}",
            url
        )));
    }

    let height = options.height();
    Ok(ViewerProps {
        default: default_state(&options),
        data: ViewerData::Websocket {
            url,
            table_name: table_name.into(),
            height,
            config: options.config,
        },
        key: options.key,
        height,
    })
}

fn default_state(options: &ViewerOptions) -> ViewerState {
    ViewerState {
        config: options.config.clone().unwrap_or_default(),
    }
}
