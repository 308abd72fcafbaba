use anyhow::Context;
use clap::Parser;
use feedbridge::{BridgeConfig, FeedServer, Generator, MarketDataSource, TableRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Streams a randomly generated market table to websocket subscribers.
#[derive(Parser, Debug)]
#[command(name = "feedbridge-server", version, about)]
struct Args {
    /// Bind address (overrides FEEDBRIDGE_BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on (overrides FEEDBRIDGE_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Name of the generated table
    #[arg(long)]
    table: Option<String>,

    /// Row capacity of the generated table
    #[arg(long)]
    capacity: Option<usize>,

    /// Milliseconds between generated batches
    #[arg(long)]
    period_ms: Option<u64>,

    /// Rows per generated batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Update batches a subscriber may fall behind before it is dropped
    #[arg(long)]
    backlog: Option<usize>,
}

impl Args {
    fn apply(self, config: &mut BridgeConfig) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(table) = self.table {
            config.table_name = table;
        }
        if let Some(capacity) = self.capacity {
            config.table_capacity = capacity;
        }
        if let Some(period) = self.period_ms {
            config.generator_period = Duration::from_millis(period);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(backlog) = self.backlog {
            config.subscriber_backlog = backlog;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedbridge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = BridgeConfig::from_env().context("failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let registry = Arc::new(TableRegistry::new());
    let table = registry
        .create(
            config.table_name.clone(),
            MarketDataSource::schema(),
            config.table_capacity,
        )
        .context("failed to create table")?;

    let server = FeedServer::new(Arc::clone(&registry), config.clone());
    let shutdown = server.shutdown_token();

    let generator = Generator::new(table, MarketDataSource::new(), config.generator())
        .spawn(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    info!("Listening on http://{}", config.bind_address());
    info!("WebSocket at {}", config.websocket_url());
    info!("Table: {}", config.table_name);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    server.serve(listener).await?;
    shutdown.cancel();

    let stats = generator.await.context("generator task failed")?;
    info!(
        cycles = stats.cycles,
        rows = stats.rows_appended,
        failed = stats.failed_batches,
        "bye"
    );
    Ok(())
}
