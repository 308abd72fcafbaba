//! Bridge configuration.

use crate::error::{FeedError, Result};
use crate::generator::{GeneratorConfig, DEFAULT_CAPACITY, DEFAULT_TABLE};
use crate::subscriptions::SubscriptionConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Feed server and demo feed settings.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bind address (0.0.0.0 for LAN, 127.0.0.1 for localhost)
    pub bind_addr: String,
    /// Port to listen on
    pub port: u16,
    /// Path of the websocket endpoint
    pub websocket_path: String,
    /// Largest websocket message accepted, in bytes (default 100MB)
    pub max_message_size: usize,
    /// Per-message write timeout; a connection that exceeds it is closed
    pub write_timeout: Duration,
    /// Update batches a subscriber may fall behind before it is dropped
    pub subscriber_backlog: usize,
    /// Name of the generated table
    pub table_name: String,
    /// Row capacity of the generated table
    pub table_capacity: usize,
    /// Time between generated batches
    pub generator_period: Duration,
    /// Rows per generated batch
    pub batch_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            websocket_path: "/websocket".to_string(),
            max_message_size: 100 * 1024 * 1024,
            write_timeout: Duration::from_secs(5),
            subscriber_backlog: 1000,
            table_name: DEFAULT_TABLE.to_string(),
            table_capacity: DEFAULT_CAPACITY,
            generator_period: Duration::from_millis(50),
            batch_size: 5,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables (and a `.env` file if
    /// present). Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            bind_addr: env::var("FEEDBRIDGE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_var("FEEDBRIDGE_PORT", defaults.port)?,
            websocket_path: env::var("FEEDBRIDGE_WEBSOCKET_PATH")
                .unwrap_or(defaults.websocket_path),
            max_message_size: parse_var("FEEDBRIDGE_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            write_timeout: Duration::from_millis(parse_var(
                "FEEDBRIDGE_WRITE_TIMEOUT_MS",
                defaults.write_timeout.as_millis() as u64,
            )?),
            subscriber_backlog: parse_var(
                "FEEDBRIDGE_SUBSCRIBER_BACKLOG",
                defaults.subscriber_backlog,
            )?,
            table_name: env::var("FEEDBRIDGE_TABLE").unwrap_or(defaults.table_name),
            table_capacity: parse_var("FEEDBRIDGE_TABLE_CAPACITY", defaults.table_capacity)?,
            generator_period: Duration::from_millis(parse_var(
                "FEEDBRIDGE_PERIOD_MS",
                defaults.generator_period.as_millis() as u64,
            )?),
            batch_size: parse_var("FEEDBRIDGE_BATCH_SIZE", defaults.batch_size)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.websocket_path.starts_with('/') {
            return Err(invalid("websocket path must start with '/'"));
        }
        if self.table_name.trim().is_empty() {
            return Err(invalid("table name must not be empty"));
        }
        if self.table_capacity == 0 {
            return Err(invalid("table capacity must be greater than zero"));
        }
        if self.subscriber_backlog == 0 {
            return Err(invalid("subscriber backlog must be greater than zero"));
        }
        if self.generator_period.is_zero() {
            return Err(invalid("generator period must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch size must be greater than zero"));
        }
        if self.write_timeout.is_zero() {
            return Err(invalid("write timeout must be greater than zero"));
        }
        Ok(())
    }

    /// Get the full bind address (addr:port)
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Websocket URL a local client would connect to.
    pub fn websocket_url(&self) -> String {
        let host = if self.bind_addr == "0.0.0.0" {
            "localhost"
        } else {
            self.bind_addr.as_str()
        };
        format!("ws://{}:{}{}", host, self.port, self.websocket_path)
    }

    pub fn generator(&self) -> GeneratorConfig {
        GeneratorConfig {
            period: self.generator_period,
            batch_size: self.batch_size,
        }
    }

    pub fn subscription(&self) -> SubscriptionConfig {
        SubscriptionConfig::with_buffer_size(self.subscriber_backlog)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

fn invalid(message: &str) -> FeedError {
    FeedError::Configuration(message.to_string())
}
