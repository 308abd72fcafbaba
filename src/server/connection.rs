//! One websocket subscriber connection.
//!
//! A connection starts `Connected`. A `subscribe` naming an existing table
//! sends the snapshot and moves it to `Subscribed`, after which every update
//! batch of that table is forwarded. Peer close, a protocol error, a failed
//! write or server shutdown end it (`Closed`) and release the subscription.

use crate::error::{FeedError, Result};
use crate::subscriptions::{DropReason, FeedEvent, SubscriptionHandle, SubscriptionId};
use crate::table::BoundedTable;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::protocol::{codes, ClientMessage, ServerMessage, WireFormat};
use super::FeedState;

/// Websocket close code for a server going away.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Websocket close code for a protocol violation.
const CLOSE_POLICY: u16 = 1008;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// The subscription held by a `Subscribed` connection. Releases itself on drop.
struct ActiveSubscription {
    table: Arc<BoundedTable>,
    id: SubscriptionId,
    handle: SubscriptionHandle,
    columns: Option<Vec<String>>,
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        if self.table.unsubscribe(self.id) {
            debug!(table = %self.table.name(), subscription = self.id.0, "subscription released");
        }
    }
}

struct Connection {
    id: u64,
    state: FeedState,
    format: WireFormat,
    sender: SplitSink<WebSocket, Message>,
    /// `None` while `Connected`, `Some` while `Subscribed`.
    active: Option<ActiveSubscription>,
}

/// Serve one upgraded websocket until it closes.
pub(super) async fn handle_socket(socket: WebSocket, state: FeedState, format: WireFormat) {
    let (sender, mut receiver) = socket.split();
    let shutdown = state.shutdown.clone();

    let mut conn = Connection {
        id: state.next_connection_id(),
        state,
        format,
        sender,
        active: None,
    };

    info!(connection = conn.id, ?format, "subscriber connected");

    loop {
        let subscription = conn
            .active
            .as_ref()
            .map(|active| (active.id, active.handle.clone()));

        let flow = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                conn.close(CLOSE_GOING_AWAY, "server shutting down").await;
                Flow::Close
            }

            Some((id, event)) = next_event(subscription) => conn.handle_event(id, event).await,

            frame = receiver.next() => match frame {
                Some(Ok(msg)) => conn.handle_frame(msg).await,
                Some(Err(e)) => {
                    debug!(connection = conn.id, error = %e, "websocket read failed");
                    Flow::Close
                }
                None => Flow::Close,
            },
        };

        if flow == Flow::Close {
            break;
        }
    }

    conn.active = None;
    info!(connection = conn.id, "subscriber disconnected");
}

impl Connection {
    async fn handle_frame(&mut self, msg: Message) -> Flow {
        let parsed = match msg {
            Message::Text(text) => ClientMessage::from_json(&text),
            Message::Binary(bytes) => ClientMessage::from_msgpack(&bytes),
            Message::Close(_) => {
                debug!(connection = self.id, "websocket closed by client");
                return Flow::Close;
            }
            // Pings are answered by the websocket layer.
            Message::Ping(_) | Message::Pong(_) => return Flow::Continue,
        };

        match parsed {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!(connection = self.id, error = %e, "malformed frame");
                let _ = self.send(&ServerMessage::from_error(&e)).await;
                self.close(CLOSE_POLICY, "malformed frame").await;
                Flow::Close
            }
        }
    }

    async fn handle_request(&mut self, request: ClientMessage) -> Flow {
        match request {
            ClientMessage::Subscribe { table, columns } => self.subscribe(&table, columns).await,

            ClientMessage::Unsubscribe => match self.active.take() {
                Some(active) => {
                    let table = active.table.name().to_string();
                    drop(active);
                    self.reply(&ServerMessage::Unsubscribed { table }).await
                }
                None => {
                    self.reply(&ServerMessage::error(
                        codes::NOT_SUBSCRIBED,
                        "no active subscription",
                    ))
                    .await
                }
            },

            ClientMessage::ListTables => {
                let tables = self.state.registry.stats();
                self.reply(&ServerMessage::Tables { tables }).await
            }
        }
    }

    /// `Connected → Subscribed`, or replace the current subscription.
    async fn subscribe(&mut self, name: &str, columns: Option<Vec<String>>) -> Flow {
        let table = match self.state.registry.get(name) {
            Ok(table) => table,
            Err(e) => return self.reject_table(name, &e).await,
        };

        let schema = match &columns {
            Some(columns) => match table.schema().project(table.name(), columns) {
                Ok(schema) => schema,
                Err(e) => return self.reply(&ServerMessage::from_error(&e)).await,
            },
            None => table.schema().clone(),
        };

        // Release any previous subscription before taking the new one.
        self.active = None;

        // Copying and encoding a large table is kept off the async workers.
        let config = self.state.config.subscription();
        let format = self.format;
        let prepared = tokio::task::spawn_blocking({
            let table = Arc::clone(&table);
            move || -> Result<_> {
                let sub = table.subscribe(config)?;
                let rows = sub.snapshot.len();
                let message = ServerMessage::snapshot(sub.snapshot, schema, columns.as_deref());
                let frame = encode(format, &message)?;
                Ok((sub.handle, rows, frame, columns))
            }
        })
        .await;

        let (handle, rows, frame, columns) = match prepared {
            Ok(Ok(prepared)) => prepared,
            Ok(Err(e @ FeedError::UnknownTable(_))) => return self.reject_table(name, &e).await,
            Ok(Err(e)) => {
                warn!(connection = self.id, error = %e, "failed to prepare snapshot");
                return self.reply(&ServerMessage::from_error(&e)).await;
            }
            Err(e) => {
                warn!(connection = self.id, error = %e, "snapshot task failed");
                return Flow::Close;
            }
        };

        let id = handle.id;
        self.active = Some(ActiveSubscription {
            table: Arc::clone(&table),
            id,
            handle,
            columns,
        });

        if let Err(e) = self.send_frame(frame).await {
            warn!(connection = self.id, error = %e, "failed to send snapshot");
            return Flow::Close;
        }

        info!(
            connection = self.id,
            table = %table.name(),
            subscription = id.0,
            rows,
            "subscribed"
        );
        Flow::Continue
    }

    /// Unknown or removed table: error response, then close.
    async fn reject_table(&mut self, name: &str, err: &FeedError) -> Flow {
        info!(connection = self.id, table = %name, "subscribe to unknown table");
        let _ = self.send(&ServerMessage::from_error(err)).await;
        self.close(CLOSE_POLICY, "unknown table").await;
        Flow::Close
    }

    async fn handle_event(&mut self, id: SubscriptionId, event: FeedEvent) -> Flow {
        let Some(active) = self.active.as_ref().filter(|a| a.id == id) else {
            // Leftover from a subscription this connection already released.
            return Flow::Continue;
        };

        match event {
            FeedEvent::Update(batch) => {
                let message = ServerMessage::update(&batch, active.columns.as_deref());
                self.reply(&message).await
            }
            FeedEvent::Dropped { reason } => {
                let table = active.table.name().to_string();
                self.active = None;

                if reason == DropReason::BufferOverflow {
                    let err = FeedError::BackpressureDrop {
                        id,
                        backlog: self.state.config.subscriber_backlog,
                    };
                    warn!(connection = self.id, table = %table, error = %err, "subscriber must resync");
                }

                let flow = self
                    .reply(&ServerMessage::Dropped {
                        table,
                        reason: reason.clone(),
                    })
                    .await;
                if reason == DropReason::Shutdown {
                    Flow::Close
                } else {
                    flow
                }
            }
        }
    }

    /// Send a message; a failed write closes the connection.
    async fn reply(&mut self, message: &ServerMessage) -> Flow {
        match self.send(message).await {
            Ok(()) => Flow::Continue,
            Err(e) => {
                warn!(connection = self.id, error = %e, "write failed, closing connection");
                Flow::Close
            }
        }
    }

    async fn send(&mut self, message: &ServerMessage) -> Result<()> {
        let frame = encode(self.format, message)?;
        self.send_frame(frame).await
    }

    async fn send_frame(&mut self, frame: Message) -> Result<()> {
        let timeout = self.state.config.write_timeout;
        match tokio::time::timeout(timeout, self.sender.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FeedError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                e.to_string(),
            ))),
            Err(_) => Err(FeedError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write timed out after {:?}", timeout),
            ))),
        }
    }

    /// Best-effort close frame.
    async fn close(&mut self, code: u16, reason: &'static str) {
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: Utf8Bytes::from_static(reason),
        }));
        let timeout = self.state.config.write_timeout;
        let _ = tokio::time::timeout(timeout, self.sender.send(frame)).await;
    }
}

fn encode(format: WireFormat, message: &ServerMessage) -> Result<Message> {
    Ok(match format {
        WireFormat::Json => Message::Text(message.to_json()?.into()),
        WireFormat::MessagePack => Message::Binary(message.to_msgpack()?.into()),
    })
}

/// Next event of the current subscription; pending forever while there is none.
async fn next_event(
    subscription: Option<(SubscriptionId, SubscriptionHandle)>,
) -> Option<(SubscriptionId, FeedEvent)> {
    match subscription {
        Some((id, handle)) => handle.recv_async().await.map(|event| (id, event)),
        None => std::future::pending().await,
    }
}
