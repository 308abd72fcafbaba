//! Websocket feed server.
//!
//! Hosts the tables of a [`TableRegistry`] over websocket connections:
//! - `GET <websocket_path>`: subscriber endpoint (`?format=msgpack` for
//!   binary frames)
//! - `GET /tables`: stats of every hosted table
//! - `GET /health`: liveness probe

mod connection;
pub mod protocol;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::table::{TableRegistry, TableStats};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use protocol::{ClientMessage, ServerMessage, WireFormat};

/// Shared application state
#[derive(Clone)]
pub struct FeedState {
    pub registry: Arc<TableRegistry>,
    pub config: Arc<BridgeConfig>,
    pub shutdown: CancellationToken,
    next_connection: Arc<AtomicU64>,
}

impl FeedState {
    fn next_connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }
}

/// Query parameters of the websocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub format: WireFormat,
}

/// Serves a table registry until its shutdown token is cancelled.
pub struct FeedServer {
    state: FeedState,
}

impl FeedServer {
    pub fn new(registry: Arc<TableRegistry>, config: BridgeConfig) -> Self {
        Self {
            state: FeedState {
                registry,
                config: Arc::new(config),
                shutdown: CancellationToken::new(),
                next_connection: Arc::new(AtomicU64::new(1)),
            },
        }
    }

    /// Token that stops the server and every connection when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub fn registry(&self) -> &Arc<TableRegistry> {
        &self.state.registry
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.state.config.websocket_path, get(handle_websocket))
            .route("/tables", get(list_tables))
            .route("/health", get(health_check))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Accept connections on `listener` until shutdown.
    ///
    /// On shutdown every open connection is closed and every subscription of
    /// every table is dropped.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let shutdown = self.state.shutdown.clone();
        let registry = Arc::clone(&self.state.registry);
        let app = self.router();

        if let Ok(addr) = listener.local_addr() {
            info!("feed server listening on {}", addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        let dropped = registry.close_all();
        info!(dropped, "feed server stopped");
        Ok(())
    }
}

/// Handle WebSocket upgrade
async fn handle_websocket(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<FeedState>,
) -> Response {
    let format = params.format;
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| connection::handle_socket(socket, state, format))
}

async fn list_tables(State(state): State<FeedState>) -> Json<Vec<TableStats>> {
    Json(state.registry.stats())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
