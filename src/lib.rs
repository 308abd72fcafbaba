//! # Feed Bridge
//!
//! A bounded live-feed bridge: a generator appends typed rows to a
//! capacity-limited table, and every change is streamed to websocket
//! subscribers as an ordered sequence of update batches.
//!
//! ## Core Concepts
//!
//! - **Tables**: Named, schema-typed row stores that evict the oldest rows
//!   once full
//! - **Update Batches**: One append's worth of added and evicted rows
//! - **Subscriptions**: Bounded per-subscriber queues; slow subscribers are
//!   dropped and resynchronize from a fresh snapshot
//! - **Feed Server**: Websocket endpoint serving one logical stream per table
//!
//! ## Example
//!
//! ```ignore
//! use feedbridge::{BridgeConfig, FeedServer, Generator, MarketDataSource, TableRegistry};
//!
//! let config = BridgeConfig::default();
//! let registry = Arc::new(TableRegistry::new());
//! let table = registry.create(&config.table_name, MarketDataSource::schema(), config.table_capacity)?;
//!
//! let server = FeedServer::new(Arc::clone(&registry), config.clone());
//! Generator::new(table, MarketDataSource::new(), config.generator())
//!     .spawn(server.shutdown_token());
//!
//! server.serve(TcpListener::bind(config.bind_address()).await?).await?;
//! ```

pub mod component;
pub mod config;
pub mod error;
pub mod generator;
pub mod server;
pub mod subscriptions;
pub mod table;
pub mod types;

// Re-exports
pub use component::{static_viewer, websocket_viewer, ViewerOptions, ViewerProps, ViewerState};
pub use config::BridgeConfig;
pub use error::{FeedError, FieldViolation, Result};
pub use generator::{Generator, GeneratorConfig, GeneratorStats, MarketDataSource, RowSource};
pub use server::{ClientMessage, FeedServer, ServerMessage, WireFormat};
pub use subscriptions::{
    DropReason, FeedEvent, Snapshot, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager, TableSubscription, UpdateBatch,
};
pub use table::{BoundedTable, TableRegistry, TableStats};
pub use types::*;
